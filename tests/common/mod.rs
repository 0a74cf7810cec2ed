//! Shared fixtures for the integration suites: in-memory pipelines over
//! temporary submission trees.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use simscan::{
    AcquireConfig, CompareConfig, FingerprintConfig, FingerprintStore, Pipeline,
    PipelineOptions, SchemaParams, SourceLocator, StoreConfig, SubmissionRef,
};

/// Fixed timestamp so re-runs produce byte-identical payloads.
pub fn submitted_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-04-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn default_params() -> SchemaParams {
    let cfg = FingerprintConfig::default();
    SchemaParams {
        k: cfg.k as u32,
        w: cfg.w as u32,
        seed: cfg.seed,
    }
}

/// An in-memory store plus a pipeline whose acquirer is rooted at `root`.
pub fn pipeline_at(root: &Path) -> (Arc<FingerprintStore>, Pipeline) {
    let store = Arc::new(
        FingerprintStore::open(StoreConfig::in_memory(default_params())).unwrap(),
    );
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        AcquireConfig {
            local_root: Some(root.to_path_buf()),
            ..Default::default()
        },
        CompareConfig::default(),
    )
    .unwrap();
    (store, pipeline)
}

/// Write a submission tree under `root/<name>` and return its locator.
pub fn write_tree(root: &Path, name: &str, files: &[(&str, &str)]) -> SourceLocator {
    let dir = root.join(name);
    for (rel_path, content) in files {
        let path = dir.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    if files.is_empty() {
        fs::create_dir_all(&dir).unwrap();
    }
    SourceLocator::LocalPath { path: dir }
}

pub fn submission(id: &str, step: &str, locator: SourceLocator) -> SubmissionRef {
    SubmissionRef {
        submission_id: id.to_string(),
        step_id: step.to_string(),
        group_id: "group-1".to_string(),
        project_id: "project-1".to_string(),
        source_locator: locator,
        submitted_at: submitted_at(),
    }
}

pub fn workspace() -> TempDir {
    tempfile::tempdir().unwrap()
}

pub fn options() -> PipelineOptions {
    PipelineOptions::default()
}

/// A realistic-sized Python program; around two hundred tokens.
pub const SOLVER: &str = "\
def parse_grid(text):
    rows = []
    for line in text.splitlines():
        line = line.strip()
        if not line:
            continue
        rows.append([int(cell) for cell in line.split()])
    return rows

def neighbors(grid, row, col):
    found = []
    for dr, dc in [(-1, 0), (1, 0), (0, -1), (0, 1)]:
        r, c = row + dr, col + dc
        if 0 <= r < len(grid) and 0 <= c < len(grid[0]):
            found.append((r, c))
    return found

def flood_fill(grid, start, target, replacement):
    stack = [start]
    seen = set()
    while stack:
        row, col = stack.pop()
        if (row, col) in seen:
            continue
        seen.add((row, col))
        if grid[row][col] != target:
            continue
        grid[row][col] = replacement
        for nxt in neighbors(grid, row, col):
            stack.append(nxt)
    return grid

def main():
    text = open('grid.txt').read()
    grid = parse_grid(text)
    flood_fill(grid, (0, 0), 0, 9)
    for row in grid:
        print(' '.join(str(cell) for cell in row))
";

/// An unrelated program for disjointness scenarios.
pub const LEDGER: &str = "\
class Account:
    def __init__(self, owner, balance):
        self.owner = owner
        self.balance = balance
        self.history = []

    def deposit(self, amount):
        if amount <= 0:
            raise ValueError('deposit must be positive')
        self.balance += amount
        self.history.append(('deposit', amount))

    def withdraw(self, amount):
        if amount > self.balance:
            raise ValueError('insufficient funds')
        self.balance -= amount
        self.history.append(('withdraw', amount))

    def statement(self):
        lines = [f'{kind}: {amount}' for kind, amount in self.history]
        return '\\n'.join(lines)
";
