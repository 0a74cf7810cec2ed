//! Observability hooks for the pipeline.
//!
//! Deployments install a [`PipelineMetrics`] recorder and/or a
//! [`PipelineEventLogger`] once at startup; every orchestrator stage is then
//! wrapped in a span that reports its latency and outcome. Both hooks are
//! process-wide and optional — when neither is installed, spans cost one
//! atomic load.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// Pipeline stage captured in observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Acquire,
    Gate,
    Tokenize,
    Fingerprint,
    Store,
    Compare,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Acquire => "acquire",
            PipelineStage::Gate => "gate",
            PipelineStage::Tokenize => "tokenize",
            PipelineStage::Fingerprint => "fingerprint",
            PipelineStage::Store => "store",
            PipelineStage::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// Outcome of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEventStatus {
    Success,
    Failure,
}

impl fmt::Display for PipelineEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineEventStatus::Success => "success",
            PipelineEventStatus::Failure => "failure",
        };
        f.write_str(label)
    }
}

/// Structured observation describing one stage's outcome.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub stage: PipelineStage,
    pub status: PipelineEventStatus,
    pub latency: Duration,
    pub submission_id: String,
    pub step_id: String,
    pub error: Option<String>,
}

impl PipelineEvent {
    fn format_key_values(&self, include_timestamp: bool) -> String {
        let mut parts = Vec::new();
        if include_timestamp {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            parts.push(format!("timestamp=\"{ts}\""));
        }
        parts.push(format!("stage={}", self.stage));
        parts.push(format!("status={}", self.status));
        parts.push(format!("latency_us={}", self.latency.as_micros()));
        parts.push(format!("submission_id=\"{}\"", escape_kv(&self.submission_id)));
        parts.push(format!("step_id=\"{}\"", escape_kv(&self.step_id)));
        if let Some(error) = &self.error {
            parts.push(format!("error=\"{}\"", escape_kv(error)));
        }
        parts.join(" ")
    }
}

fn escape_kv(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_stage(&self, stage: PipelineStage, latency: Duration, success: bool);
}

/// Hook for emitting structured events per pipeline stage.
pub trait PipelineEventLogger: Send + Sync {
    fn log(&self, event: &PipelineEvent);
}

/// Key-value logger writing structured events to any writer.
pub struct KeyValueLogger {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    include_timestamp: bool,
}

impl KeyValueLogger {
    /// Logger that writes to stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            include_timestamp: true,
        }
    }

    /// Toggle timestamp emission.
    pub fn with_timestamps(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }
}

impl PipelineEventLogger for KeyValueLogger {
    fn log(&self, event: &PipelineEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            let line = event.format_key_values(self.include_timestamp);
            let _ = writeln!(writer, "{line}");
        }
    }
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|p| p.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    metrics_lock()
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .clone()
}

/// Install or clear the structured pipeline event logger.
pub fn set_pipeline_logger(logger: Option<Arc<dyn PipelineEventLogger>>) {
    let lock = logger_lock();
    let mut guard = lock.write().unwrap_or_else(|p| p.into_inner());
    *guard = logger;
}

fn logger_lock() -> &'static RwLock<Option<Arc<dyn PipelineEventLogger>>> {
    static LOGGER: OnceLock<RwLock<Option<Arc<dyn PipelineEventLogger>>>> = OnceLock::new();
    LOGGER.get_or_init(|| RwLock::new(None))
}

fn pipeline_logger() -> Option<Arc<dyn PipelineEventLogger>> {
    logger_lock()
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .clone()
}

/// RAII-style span over one stage of one submission run.
pub(crate) struct StageSpan {
    recorder: Option<Arc<dyn PipelineMetrics>>,
    logger: Option<Arc<dyn PipelineEventLogger>>,
    stage: PipelineStage,
    submission_id: String,
    step_id: String,
    start: Instant,
}

impl StageSpan {
    pub(crate) fn start(
        stage: PipelineStage,
        submission_id: &str,
        step_id: &str,
    ) -> Option<Self> {
        let recorder = metrics_recorder();
        let logger = pipeline_logger();
        if recorder.is_none() && logger.is_none() {
            return None;
        }
        Some(Self {
            recorder,
            logger,
            stage,
            submission_id: submission_id.to_string(),
            step_id: step_id.to_string(),
            start: Instant::now(),
        })
    }

    pub(crate) fn finish(self, error: Option<String>) {
        let latency = self.start.elapsed();
        if let Some(recorder) = &self.recorder {
            recorder.record_stage(self.stage, latency, error.is_none());
        }
        if let Some(logger) = &self.logger {
            let status = if error.is_some() {
                PipelineEventStatus::Failure
            } else {
                PipelineEventStatus::Success
            };
            logger.log(&PipelineEvent {
                stage: self.stage,
                status,
                latency,
                submission_id: self.submission_id.clone(),
                step_id: self.step_id.clone(),
                error,
            });
        }
    }
}

/// Finish a possibly-absent span.
pub(crate) fn finish_span(span: Option<StageSpan>, error: Option<String>) {
    if let Some(span) = span {
        span.finish(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_formats_as_key_values() {
        let event = PipelineEvent {
            stage: PipelineStage::Tokenize,
            status: PipelineEventStatus::Success,
            latency: Duration::from_micros(1500),
            submission_id: "sub-1".into(),
            step_id: "step-1".into(),
            error: None,
        };
        let line = event.format_key_values(false);
        assert!(line.contains("stage=tokenize"));
        assert!(line.contains("status=success"));
        assert!(line.contains("latency_us=1500"));
        assert!(line.contains("submission_id=\"sub-1\""));
        assert!(!line.contains("error="));
    }

    #[test]
    fn failure_events_carry_the_error() {
        let event = PipelineEvent {
            stage: PipelineStage::Store,
            status: PipelineEventStatus::Failure,
            latency: Duration::from_micros(10),
            submission_id: "sub-1".into(),
            step_id: "step-1".into(),
            error: Some("backend error: \"disk full\"".into()),
        };
        let line = event.format_key_values(false);
        assert!(line.contains("status=failure"));
        assert!(line.contains("error=\"backend error: \\\"disk full\\\"\""));
    }

    #[test]
    fn spans_are_skipped_without_hooks() {
        set_pipeline_metrics(None);
        set_pipeline_logger(None);
        assert!(StageSpan::start(PipelineStage::Acquire, "s", "t").is_none());
    }
}
