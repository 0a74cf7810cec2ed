//! Command-line driver: run one submission through the pipeline and print
//! the outcome as JSON, or migrate an existing store to the current
//! parameters.
//!
//! ```text
//! simscan --submission <id> --step <id> --source <url-or-path> \
//!         [--config simscan.yaml] [--rules rules.json] [--log]
//! simscan --migrate --config simscan.yaml
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use simscan::config::{OptionsPatch, SimscanConfig};
use simscan::{
    set_pipeline_logger, KeyValueLogger, Pipeline, RuleSpec, SourceLocator, StoreConfig,
    SubmissionRef,
};

struct Args {
    submission_id: String,
    step_id: String,
    source: String,
    config_path: Option<String>,
    rules_path: Option<String>,
    log: bool,
    migrate: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut submission_id = None;
    let mut step_id = None;
    let mut source = None;
    let mut config_path = None;
    let mut rules_path = None;
    let mut log = false;
    let mut migrate = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--submission" => submission_id = args.next(),
            "--step" => step_id = args.next(),
            "--source" => source = args.next(),
            "--config" => config_path = args.next(),
            "--rules" => rules_path = args.next(),
            "--log" => log = true,
            "--migrate" => migrate = true,
            "--help" | "-h" => {
                return Err(USAGE.to_string());
            }
            other => return Err(format!("unknown argument: {other}\n{USAGE}")),
        }
    }

    if migrate {
        return Ok(Args {
            submission_id: String::new(),
            step_id: String::new(),
            source: String::new(),
            config_path,
            rules_path,
            log,
            migrate,
        });
    }

    Ok(Args {
        submission_id: submission_id.ok_or_else(|| format!("--submission is required\n{USAGE}"))?,
        step_id: step_id.ok_or_else(|| format!("--step is required\n{USAGE}"))?,
        source: source.ok_or_else(|| format!("--source is required\n{USAGE}"))?,
        config_path,
        rules_path,
        log,
        migrate,
    })
}

const USAGE: &str = "usage: simscan --submission <id> --step <id> --source <url-or-path> \
[--config simscan.yaml] [--rules rules.json] [--log]\n       simscan --migrate --config simscan.yaml";

fn run() -> Result<(), String> {
    let args = parse_args()?;

    if args.log {
        set_pipeline_logger(Some(Arc::new(KeyValueLogger::stdout())));
    }

    let config = match &args.config_path {
        Some(path) => SimscanConfig::from_file(path).map_err(|e| e.to_string())?,
        None => SimscanConfig::default(),
    };

    let rules: Vec<RuleSpec> = match &args.rules_path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str(&content).map_err(|e| e.to_string())?
        }
        None => Vec::new(),
    };

    let options = config.resolve_options(&OptionsPatch::default());
    let store_config = StoreConfig {
        backend: config.store.to_backend_config(),
        compression: Default::default(),
        params: simscan::SchemaParams {
            k: options.k_gram_size as u32,
            w: options.window_size as u32,
            seed: simscan::FingerprintConfig::default().seed,
        },
    };
    if args.migrate {
        let report = simscan::migrate(&store_config).map_err(|e| e.to_string())?;
        println!(
            "migrated {} submission(s): {} file(s) re-fingerprinted, {} dropped, {} stale result(s) deleted",
            report.migrated_submissions,
            report.refingerprinted_files,
            report.dropped_files,
            report.deleted_results
        );
        return Ok(());
    }

    let store = Arc::new(
        simscan::FingerprintStore::open(store_config).map_err(|e| e.to_string())?,
    );

    let pipeline = Pipeline::new(
        store,
        config
            .acquire
            .to_acquire_config(options.total_tree_byte_cap),
        config.compare.to_compare_config(),
    )
    .map_err(|e| e.to_string())?;

    let submission = SubmissionRef {
        submission_id: args.submission_id,
        step_id: args.step_id,
        group_id: String::new(),
        project_id: String::new(),
        source_locator: SourceLocator::parse(&args.source),
        submitted_at: chrono::Utc::now(),
    };

    let outcome = pipeline.run(&submission, &rules, &options);
    let rendered =
        serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())?;
    println!("{rendered}");

    if outcome.is_done() {
        Ok(())
    } else {
        Err("pipeline failed".to_string())
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
