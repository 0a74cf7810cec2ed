//! End-to-end pipeline scenarios: acquisition through comparison against
//! stored peers.

mod common;

use common::*;
use simscan::{PipelineState, RuleSpec};

#[test]
fn exact_clone_scores_one_with_full_coverage() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("main.py", SOLVER)]),
    );

    let first = pipeline.run(&s1, &[], &options());
    assert!(first.is_done(), "{:?}", first.error);
    assert!(first.summaries.is_empty(), "no peers yet");

    let second = pipeline.run(&s2, &[], &options());
    assert!(second.is_done(), "{:?}", second.error);
    assert_eq!(second.summaries.len(), 1);

    let summary = &second.summaries[0];
    assert_eq!(summary.peer_submission_id, "sub-a");
    assert_eq!(summary.score, 1.0);
    assert!(summary.region_count >= 1);
    assert!(!summary.low_confidence);

    // Score 1.0 clears the default 0.7 alert threshold.
    assert_eq!(second.alerts.len(), 1);

    // The handle exposes regions and token streams for rendering.
    let handle = pipeline.results("step-1", "sub-b");
    let regions = handle.match_regions("sub-a").unwrap();
    assert!(!regions.is_empty());
    assert!(regions.iter().all(|r| r.file_a == "main.py"));
    let stream = handle.token_stream("main.py").unwrap().unwrap();
    assert!(stream.tokens.len() > 100);
}

#[test]
fn identifier_rename_still_scores_one() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let renamed = SOLVER
        .replace("grid", "board")
        .replace("flood_fill", "paint")
        .replace("stack", "frontier")
        .replace("seen", "visited");

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("main.py", &renamed)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());
    assert_eq!(outcome.summaries[0].score, 1.0);
}

#[test]
fn reformatting_and_comments_score_one() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    // Same token stream, different whitespace plus added comments.
    let reformatted: String = SOLVER
        .lines()
        .map(|line| format!("{line}   # reviewed\n"))
        .collect();

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("main.py", &reformatted)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());
    assert_eq!(outcome.summaries[0].score, 1.0);
}

#[test]
fn partial_copy_scores_fractionally_with_aligned_region() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(
            ws.path(),
            "s1",
            &[("solver.py", SOLVER), ("ledger.py", LEDGER)],
        ),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("solver.py", SOLVER)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());

    let summary = &outcome.summaries[0];
    assert!(
        summary.score > 0.0 && summary.score < 1.0,
        "score {}",
        summary.score
    );

    let handle = pipeline.results("step-1", "sub-b");
    let regions = handle.match_regions("sub-a").unwrap();
    assert!(regions
        .iter()
        .any(|r| r.file_a == "solver.py" && r.file_b == "solver.py"));
}

#[test]
fn disjoint_submissions_score_zero() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("a.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("b.py", LEDGER)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());
    assert_eq!(outcome.summaries[0].score, 0.0);
    assert!(outcome.alerts.is_empty());
}

#[test]
fn steps_are_isolated_cohorts() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-2",
        write_tree(ws.path(), "s2", &[("main.py", SOLVER)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());
    // Identical code in a different step is never compared.
    assert!(outcome.summaries.is_empty());
}

#[test]
fn rule_gate_blocks_before_any_fingerprints() {
    let ws = workspace();
    let (store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("src/main.py", SOLVER)]),
    );
    let rules = vec![RuleSpec::new(
        "file_presence",
        serde_json::json!({ "must_exist": ["README*"] }),
    )];

    let outcome = pipeline.run(&s1, &rules, &options());
    assert_eq!(outcome.state, PipelineState::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().code, "validationFailed");

    let failure = outcome.rule_report.failures().next().unwrap();
    assert!(failure
        .violations
        .iter()
        .any(|v| v.code == "missingRequiredFiles"));

    // Nothing was written for the blocked submission.
    assert!(store.fingerprint_set("step-1", "sub-a").unwrap().is_none());
    assert!(store.peers("step-1").unwrap().is_empty());
}

#[test]
fn passing_rules_are_reported_in_the_outcome() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(
            ws.path(),
            "s1",
            &[("README.md", "# project\n"), ("src/main.py", SOLVER)],
        ),
    );
    let rules = vec![
        RuleSpec::new("file_presence", serde_json::json!({ "must_exist": ["README*"] })),
        RuleSpec::new("max_archive_size", serde_json::json!({ "max_size_mb": 10 })),
        RuleSpec::new(
            "directory_structure",
            serde_json::json!({ "required_directories": ["src"] }),
        ),
    ];

    let outcome = pipeline.run(&s1, &rules, &options());
    assert!(outcome.is_done(), "{:?}", outcome.error);
    assert_eq!(outcome.rule_report.outcomes.len(), 3);
    assert!(outcome.rule_report.passed());
}

#[test]
fn deadline_expiry_fails_without_partial_writes() {
    let ws = workspace();
    let (store, pipeline) = pipeline_at(ws.path());

    // Enough files that the walk plus gate alone outlast a 1 ms deadline.
    let files: Vec<(String, String)> = (0..800)
        .map(|i| (format!("src/mod_{i:03}.py"), format!("value_{i} = {i}\n")))
        .collect();
    let file_refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &file_refs),
    );
    let tight = simscan::PipelineOptions {
        deadline_ms: 1,
        ..options()
    };

    let outcome = pipeline.run(&s1, &[], &tight);
    assert_eq!(outcome.state, PipelineState::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().code, "deadlineExceeded");

    // No partial fingerprint set landed in the store.
    assert!(store.fingerprint_set("step-1", "sub-a").unwrap().is_none());
}

#[test]
fn empty_tree_produces_zero_fingerprints_and_zero_scores() {
    let ws = workspace();
    let (store, pipeline) = pipeline_at(ws.path());

    let peer = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    assert!(pipeline.run(&peer, &[], &options()).is_done());

    let empty = submission("sub-b", "step-1", write_tree(ws.path(), "s2", &[]));
    let outcome = pipeline.run(&empty, &[], &options());
    assert!(outcome.is_done(), "{:?}", outcome.error);

    let set = store.fingerprint_set("step-1", "sub-b").unwrap().unwrap();
    assert!(set.is_empty());
    assert_eq!(outcome.summaries[0].score, 0.0);
    assert!(outcome.summaries[0].low_confidence);
}

#[test]
fn winnowing_guarantee_detects_embedded_shared_block() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    // A contiguous shared block well beyond w + k - 1 = 11 tokens,
    // embedded in otherwise unrelated programs.
    let shared_block = "\
def checksum(data):
    total = 0
    for index, byte in enumerate(data):
        total = (total + index * byte) % 65521
    return total
";
    let a = format!("{SOLVER}\n{shared_block}");
    let b = format!("{LEDGER}\n{shared_block}");

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("a.py", &a)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("b.py", &b)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let outcome = pipeline.run(&s2, &[], &options());

    let summary = &outcome.summaries[0];
    assert!(summary.score > 0.0, "winnowing guarantee violated");
    assert!(summary.region_count >= 1);
}

#[test]
fn rerun_overwrites_idempotently() {
    let ws = workspace();
    let (store, pipeline) = pipeline_at(ws.path());

    let s1 = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let s2 = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("main.py", SOLVER)]),
    );

    assert!(pipeline.run(&s1, &[], &options()).is_done());
    let first = pipeline.run(&s2, &[], &options());
    let bytes_first = store.raw_fingerprint_bytes("step-1", "sub-b").unwrap();
    let result_first = store.result("step-1", "sub-a", "sub-b").unwrap();

    let second = pipeline.run(&s2, &[], &options());
    let bytes_second = store.raw_fingerprint_bytes("step-1", "sub-b").unwrap();
    let result_second = store.result("step-1", "sub-a", "sub-b").unwrap();

    assert_eq!(first, second);
    assert_eq!(bytes_first, bytes_second);
    assert_eq!(result_first, result_second);
    // The step index holds each submission once.
    assert_eq!(store.peers("step-1").unwrap(), vec!["sub-a", "sub-b"]);
}

#[test]
fn summaries_sort_by_score_descending() {
    let ws = workspace();
    let (_store, pipeline) = pipeline_at(ws.path());

    let clone = submission(
        "sub-a",
        "step-1",
        write_tree(ws.path(), "s1", &[("main.py", SOLVER)]),
    );
    let unrelated = submission(
        "sub-b",
        "step-1",
        write_tree(ws.path(), "s2", &[("main.py", LEDGER)]),
    );
    let newcomer = submission(
        "sub-c",
        "step-1",
        write_tree(ws.path(), "s3", &[("main.py", SOLVER)]),
    );

    assert!(pipeline.run(&clone, &[], &options()).is_done());
    assert!(pipeline.run(&unrelated, &[], &options()).is_done());
    let outcome = pipeline.run(&newcomer, &[], &options());

    assert_eq!(outcome.summaries.len(), 2);
    assert_eq!(outcome.summaries[0].peer_submission_id, "sub-a");
    assert_eq!(outcome.summaries[0].score, 1.0);
    assert!(outcome.summaries[1].score < outcome.summaries[0].score);
    assert_eq!(outcome.alerts.len(), 1);
}
