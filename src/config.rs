//! YAML process configuration for the simscan pipeline.
//!
//! Deployments describe the store backend, acquisition limits and default
//! run options in a single YAML file loaded at startup. Option resolution
//! is layered: explicit per-request options beat the process configuration,
//! which beats the built-in defaults. A handful of environment variables
//! override the process-config layer for container deployments.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//! name: "production"
//!
//! acquire:
//!   local_root: "/srv/submissions"
//!   max_concurrent: 4
//!
//! store:
//!   backend: "redb"
//!   path: "/data/simscan.redb"
//!
//! pipeline:
//!   k_gram_size: 5
//!   window_size: 7
//!   alert_threshold: 0.7
//!   per_file_byte_cap: 1048576
//!   total_tree_byte_cap: 524288000
//!   deadline_ms: 600000
//!
//! compare:
//!   low_confidence_floor: 10
//!   max_pair_work: 1000000
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{default_parallelism, PipelineOptions};

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimscanConfig {
    /// Configuration format version.
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub acquire: AcquireYamlConfig,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub pipeline: PipelineYamlConfig,

    #[serde(default)]
    pub compare: CompareYamlConfig,

    /// Free-form env overrides recorded in the file for documentation.
    #[serde(default)]
    pub env_overrides: HashMap<String, String>,
}

impl SimscanConfig {
    /// Load a YAML configuration file and apply environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string and apply environment
    /// overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let mut config: SimscanConfig = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        self.store.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    /// Environment variables override the process-config layer:
    /// `SIMSCAN_DEADLINE_MS`, `SIMSCAN_PARALLELISM`,
    /// `SIMSCAN_ALERT_THRESHOLD`, `SIMSCAN_STORE_PATH`.
    fn apply_env_overrides(&mut self) {
        if let Some(value) = env_parse::<u64>("SIMSCAN_DEADLINE_MS") {
            self.pipeline.deadline_ms = value;
        }
        if let Some(value) = env_parse::<usize>("SIMSCAN_PARALLELISM") {
            self.pipeline.parallelism = Some(value);
        }
        if let Some(value) = env_parse::<f64>("SIMSCAN_ALERT_THRESHOLD") {
            self.pipeline.alert_threshold = value;
        }
        if let Ok(value) = std::env::var("SIMSCAN_STORE_PATH") {
            if !value.is_empty() {
                self.store.path = Some(value);
            }
        }
    }

    /// Resolve effective run options: explicit patch > this config >
    /// built-in defaults.
    pub fn resolve_options(&self, explicit: &OptionsPatch) -> PipelineOptions {
        let p = &self.pipeline;
        PipelineOptions {
            k_gram_size: explicit.k_gram_size.unwrap_or(p.k_gram_size),
            window_size: explicit.window_size.unwrap_or(p.window_size),
            alert_threshold: explicit.alert_threshold.unwrap_or(p.alert_threshold),
            per_file_byte_cap: explicit.per_file_byte_cap.unwrap_or(p.per_file_byte_cap),
            total_tree_byte_cap: explicit
                .total_tree_byte_cap
                .unwrap_or(p.total_tree_byte_cap),
            deadline_ms: explicit.deadline_ms.unwrap_or(p.deadline_ms),
            parallelism: explicit
                .parallelism
                .or(p.parallelism)
                .unwrap_or_else(default_parallelism),
            store_token_streams: explicit
                .store_token_streams
                .unwrap_or(p.store_token_streams),
        }
    }
}

impl Default for SimscanConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            acquire: AcquireYamlConfig::default(),
            store: StoreYamlConfig::default(),
            pipeline: PipelineYamlConfig::default(),
            compare: CompareYamlConfig::default(),
            env_overrides: HashMap::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Per-request option overrides; every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptionsPatch {
    pub k_gram_size: Option<usize>,
    pub window_size: Option<usize>,
    pub alert_threshold: Option<f64>,
    pub per_file_byte_cap: Option<u64>,
    pub total_tree_byte_cap: Option<u64>,
    pub deadline_ms: Option<u64>,
    pub parallelism: Option<usize>,
    pub store_token_streams: Option<bool>,
}

/// Acquisition section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireYamlConfig {
    /// Root directory local-path submissions must resolve under.
    pub local_root: Option<PathBuf>,
    pub max_concurrent: usize,
}

impl Default for AcquireYamlConfig {
    fn default() -> Self {
        Self {
            local_root: None,
            max_concurrent: 4,
        }
    }
}

impl AcquireYamlConfig {
    pub fn to_acquire_config(&self, byte_cap: u64) -> acquire::AcquireConfig {
        acquire::AcquireConfig {
            version: 1,
            byte_cap,
            local_root: self.local_root.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreYamlConfig {
    /// `"redb"` or `"in_memory"`.
    pub backend: String,
    /// Database file path; required for the redb backend.
    pub path: Option<String>,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            path: None,
        }
    }
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.backend.as_str() {
            "in_memory" => Ok(()),
            "redb" => {
                if self.path.is_none() {
                    return Err(ConfigLoadError::Validation(
                        "store.path is required when backend is 'redb'".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: [\"in_memory\", \"redb\"], got {other:?}"
            ))),
        }
    }

    pub fn to_backend_config(&self) -> store::BackendConfig {
        match self.backend.as_str() {
            "redb" => store::BackendConfig::redb(self.path.clone().unwrap_or_default()),
            _ => store::BackendConfig::in_memory(),
        }
    }
}

/// Pipeline option defaults; mirrors [`PipelineOptions`] with serde
/// defaults at the built-in values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineYamlConfig {
    pub k_gram_size: usize,
    pub window_size: usize,
    pub alert_threshold: f64,
    pub per_file_byte_cap: u64,
    pub total_tree_byte_cap: u64,
    pub deadline_ms: u64,
    /// `None` means "logical CPU count at runtime".
    pub parallelism: Option<usize>,
    pub store_token_streams: bool,
}

impl Default for PipelineYamlConfig {
    fn default() -> Self {
        let defaults = PipelineOptions::default();
        Self {
            k_gram_size: defaults.k_gram_size,
            window_size: defaults.window_size,
            alert_threshold: defaults.alert_threshold,
            per_file_byte_cap: defaults.per_file_byte_cap,
            total_tree_byte_cap: defaults.total_tree_byte_cap,
            deadline_ms: defaults.deadline_ms,
            parallelism: None,
            store_token_streams: defaults.store_token_streams,
        }
    }
}

impl PipelineYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.k_gram_size < 2 {
            return Err(ConfigLoadError::Validation(
                "pipeline.k_gram_size must be >= 2".to_string(),
            ));
        }
        if self.window_size < self.k_gram_size {
            return Err(ConfigLoadError::Validation(
                "pipeline.window_size must be >= pipeline.k_gram_size".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(ConfigLoadError::Validation(
                "pipeline.alert_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Comparison section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareYamlConfig {
    pub low_confidence_floor: usize,
    pub max_pair_work: u64,
}

impl Default for CompareYamlConfig {
    fn default() -> Self {
        let defaults = compare::CompareConfig::default();
        Self {
            low_confidence_floor: defaults.low_confidence_floor,
            max_pair_work: defaults.max_pair_work,
        }
    }
}

impl CompareYamlConfig {
    pub fn to_compare_config(&self) -> compare::CompareConfig {
        compare::CompareConfig {
            version: 1,
            low_confidence_floor: self.low_confidence_floor,
            max_pair_work: self.max_pair_work,
        }
    }
}
