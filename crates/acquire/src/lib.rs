//! Repository acquisition for the simscan pipeline.
//!
//! Turns a submission's source locator into a read-only [`MaterializedTree`]
//! on local disk. Git URLs are shallow-cloned into a temporary directory
//! that lives exactly as long as the tree value; local paths are snapshotted
//! by reference (no copy) and must resolve under the configured root.
//!
//! Size caps are enforced during the inventory walk: the walk aborts the
//! moment the running byte total exceeds the cap, so an adversarial
//! repository cannot exhaust the disk before being rejected. Acquisition
//! failures are terminal for a submission; nothing downstream runs.

mod limiter;

pub use crate::limiter::{AcquireGate, GateGuard};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;

/// Directories excluded from the inventory: VCS metadata is never part of
/// the submission.
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Where a submission's source lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceLocator {
    /// Remote git repository; shallow-cloned at the default branch or the
    /// given ref.
    Git {
        url: String,
        #[serde(default)]
        reference: Option<String>,
    },
    /// Local filesystem path inside the configured root.
    LocalPath { path: PathBuf },
}

impl SourceLocator {
    /// Parse a raw locator string: anything that looks like a git remote
    /// becomes [`SourceLocator::Git`], everything else a local path.
    pub fn parse(raw: &str) -> SourceLocator {
        let trimmed = raw.trim();
        let looks_like_git = trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("git@")
            || trimmed.starts_with("ssh://")
            || trimmed.ends_with(".git");
        if looks_like_git {
            SourceLocator::Git {
                url: trimmed.to_string(),
                reference: None,
            }
        } else {
            SourceLocator::LocalPath {
                path: PathBuf::from(trimmed),
            }
        }
    }
}

/// Acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Total on-disk byte cap for a materialized tree. A tree at exactly
    /// the cap is accepted; one byte over is rejected.
    pub byte_cap: u64,
    /// Root directory local-path submissions must resolve under. `None`
    /// disables local-path acquisition entirely.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// Maximum concurrent in-flight acquisitions.
    #[serde(default = "AcquireConfig::default_max_concurrent")]
    pub max_concurrent: usize,
}

impl AcquireConfig {
    pub(crate) fn default_max_concurrent() -> usize {
        4
    }

    pub fn validate(&self) -> Result<(), AcquireError> {
        if self.version == 0 {
            return Err(AcquireError::AcquisitionFailed {
                reason: "config version must be >= 1".into(),
            });
        }
        if self.byte_cap == 0 {
            return Err(AcquireError::AcquisitionFailed {
                reason: "byte_cap must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            version: 1,
            byte_cap: 500 * 1024 * 1024,
            local_root: None,
            max_concurrent: Self::default_max_concurrent(),
        }
    }
}

/// Errors that terminate acquisition. Codes are stable strings surfaced
/// verbatim in pipeline outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AcquireError {
    #[error("acquisition failed: {reason}")]
    AcquisitionFailed { reason: String },
    #[error("repository too large: {size} bytes exceeds cap of {cap} bytes")]
    RepositoryTooLarge { size: u64, cap: u64 },
    #[error("path not allowed: {path}")]
    PathNotAllowed { path: String },
}

impl AcquireError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AcquireError::AcquisitionFailed { .. } => "acquisitionFailed",
            AcquireError::RepositoryTooLarge { .. } => "repositoryTooLarge",
            AcquireError::PathNotAllowed { .. } => "pathNotAllowed",
        }
    }
}

/// One file in the inventory, relative to the tree root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub rel_path: String,
    pub size: u64,
}

/// One directory in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirEntry {
    pub rel_path: String,
    /// Edges from the tree root.
    pub depth: usize,
    /// Direct children (files and directories).
    pub entry_count: usize,
}

/// A materialized, read-only view of a submission's tree.
///
/// Holds the backing temporary directory for cloned repositories; dropping
/// the tree removes the clone. Local-path trees reference the original
/// directory and never delete it.
#[derive(Debug)]
pub struct MaterializedTree {
    root: PathBuf,
    files: Vec<FileEntry>,
    dirs: Vec<DirEntry>,
    total_bytes: u64,
    _temp: Option<TempDir>,
}

impl MaterializedTree {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn dirs(&self) -> &[DirEntry] {
        &self.dirs
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Read one inventoried file's bytes.
    pub fn read_file(&self, rel_path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.root.join(rel_path))
    }
}

/// The acquirer: configuration plus the concurrency gate.
pub struct Acquirer {
    config: AcquireConfig,
    gate: AcquireGate,
}

impl Acquirer {
    pub fn new(config: AcquireConfig) -> Result<Self, AcquireError> {
        config.validate()?;
        let gate = AcquireGate::new(config.max_concurrent);
        Ok(Self { config, gate })
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    /// Materialize a submission source. Blocks while the gate is full.
    pub fn acquire(&self, locator: &SourceLocator) -> Result<MaterializedTree, AcquireError> {
        self.acquire_capped(locator, self.config.byte_cap)
    }

    /// Materialize with an explicit byte cap, overriding the configured
    /// default for this run. The concurrency gate is still shared.
    pub fn acquire_capped(
        &self,
        locator: &SourceLocator,
        byte_cap: u64,
    ) -> Result<MaterializedTree, AcquireError> {
        let _slot = self.gate.enter();
        match locator {
            SourceLocator::Git { url, reference } => {
                self.acquire_git(url, reference.as_deref(), byte_cap)
            }
            SourceLocator::LocalPath { path } => self.acquire_local(path, byte_cap),
        }
    }

    fn acquire_git(
        &self,
        url: &str,
        reference: Option<&str>,
        byte_cap: u64,
    ) -> Result<MaterializedTree, AcquireError> {
        let temp = TempDir::new().map_err(|e| AcquireError::AcquisitionFailed {
            reason: format!("failed to create temp directory: {e}"),
        })?;
        let clone_path = temp.path().to_path_buf();

        tracing::info!(url, reference, "shallow cloning submission repository");

        let mut args = vec!["clone", "--depth", "1", "--single-branch"];
        if let Some(branch) = reference {
            args.push("--branch");
            args.push(branch);
        }
        let path_arg = clone_path.to_string_lossy().to_string();
        args.push(url);
        args.push(&path_arg);

        let output = Command::new("git").args(&args).output().map_err(|e| {
            AcquireError::AcquisitionFailed {
                reason: format!("failed to run git: {e}"),
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(url, "git clone failed: {}", stderr.trim());
            return Err(AcquireError::AcquisitionFailed {
                reason: format!("git clone failed: {}", stderr.trim()),
            });
        }

        let (files, dirs, total_bytes) = inventory(&clone_path, byte_cap)?;
        tracing::info!(
            url,
            files = files.len(),
            total_bytes,
            "submission repository materialized"
        );
        Ok(MaterializedTree {
            root: clone_path,
            files,
            dirs,
            total_bytes,
            _temp: Some(temp),
        })
    }

    fn acquire_local(&self, path: &Path, byte_cap: u64) -> Result<MaterializedTree, AcquireError> {
        let root = self.config.local_root.as_ref().ok_or_else(|| {
            AcquireError::PathNotAllowed {
                path: path.display().to_string(),
            }
        })?;
        let allowed = root
            .canonicalize()
            .map_err(|e| AcquireError::AcquisitionFailed {
                reason: format!("local root unavailable: {e}"),
            })?;
        let resolved = path
            .canonicalize()
            .map_err(|e| AcquireError::AcquisitionFailed {
                reason: format!("local path unavailable: {e}"),
            })?;
        if !resolved.starts_with(&allowed) {
            return Err(AcquireError::PathNotAllowed {
                path: path.display().to_string(),
            });
        }
        if !resolved.is_dir() {
            return Err(AcquireError::AcquisitionFailed {
                reason: format!("local path is not a directory: {}", resolved.display()),
            });
        }

        let (files, dirs, total_bytes) = inventory(&resolved, byte_cap)?;
        tracing::debug!(
            path = %resolved.display(),
            files = files.len(),
            total_bytes,
            "local submission snapshotted by reference"
        );
        Ok(MaterializedTree {
            root: resolved,
            files,
            dirs,
            total_bytes,
            _temp: None,
        })
    }
}

fn is_vcs_dir(name: &str) -> bool {
    VCS_DIRS.contains(&name)
}

/// Walk the tree, building the file and directory inventories. Aborts with
/// `repositoryTooLarge` as soon as the running total passes the cap.
fn inventory(
    root: &Path,
    byte_cap: u64,
) -> Result<(Vec<FileEntry>, Vec<DirEntry>, u64), AcquireError> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut total_bytes = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && is_vcs_dir(&name))
        });

    for entry in walker {
        let entry = entry.map_err(|e| AcquireError::AcquisitionFailed {
            reason: format!("walk failed: {e}"),
        })?;
        if entry.path() == root {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| AcquireError::AcquisitionFailed {
                reason: format!("path outside root: {e}"),
            })?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            let entry_count = std::fs::read_dir(entry.path())
                .map(|rd| rd.count())
                .unwrap_or(0);
            dirs.push(DirEntry {
                depth: rel_path.split('/').count(),
                rel_path,
                entry_count,
            });
        } else if entry.file_type().is_file() {
            let size = entry
                .metadata()
                .map_err(|e| AcquireError::AcquisitionFailed {
                    reason: format!("stat failed: {e}"),
                })?
                .len();
            total_bytes += size;
            if total_bytes > byte_cap {
                return Err(AcquireError::RepositoryTooLarge {
                    size: total_bytes,
                    cap: byte_cap,
                });
            }
            files.push(FileEntry { rel_path, size });
        }
    }

    Ok((files, dirs, total_bytes))
}
