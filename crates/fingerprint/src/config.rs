//! Configuration for the fingerprinting stage.
//!
//! The parameter triple `(k, w, seed)` together with the canonical token
//! byte encoding defines the fingerprint space. The store records all of
//! them in its schema sentinel; changing any of them invalidates every
//! persisted fingerprint set, so they are versioned here rather than passed
//! around loose.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default k-gram size.
pub const DEFAULT_K: usize = 5;
/// Default winnowing window (k + 2).
pub const DEFAULT_W: usize = 7;
/// Default hash seed for token hashing and the rolling polynomial base.
pub const DEFAULT_SEED: u64 = 0x5349_4D53_4341_4E01;

/// Runtime configuration for fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintConfig {
    /// Configuration schema version; bump on breaking parameter changes.
    pub version: u32,
    /// k-gram size in tokens. Must be >= 2.
    pub k: usize,
    /// Winnowing window size in k-grams. Must be >= 1.
    pub w: usize,
    /// Seed for the per-token hash and the rolling base derivation.
    pub seed: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            version: 1,
            k: DEFAULT_K,
            w: DEFAULT_W,
            seed: DEFAULT_SEED,
        }
    }
}

/// Errors raised by configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FingerprintError {
    #[error("config version must be >= 1, got {version}")]
    InvalidVersion { version: u32 },
    #[error("k-gram size must be >= 2, got {k}")]
    InvalidK { k: usize },
    #[error("window size must be >= 1, got {w}")]
    InvalidW { w: usize },
}

impl FingerprintConfig {
    /// Validate internal consistency; call once at startup.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        if self.version == 0 {
            return Err(FingerprintError::InvalidVersion {
                version: self.version,
            });
        }
        if self.k < 2 {
            return Err(FingerprintError::InvalidK { k: self.k });
        }
        if self.w == 0 {
            return Err(FingerprintError::InvalidW { w: self.w });
        }
        Ok(())
    }

    /// Minimum shared token-substring length the winnowing guarantee covers:
    /// any shared run of at least `w + k - 1` tokens yields a shared
    /// fingerprint.
    pub fn guarantee_threshold(&self) -> usize {
        self.w + self.k - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = FingerprintConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.k, 5);
        assert_eq!(cfg.w, 7);
        assert_eq!(cfg.guarantee_threshold(), 11);
    }

    #[test]
    fn zero_version_rejected() {
        let cfg = FingerprintConfig {
            version: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(FingerprintError::InvalidVersion { version: 0 })
        ));
    }

    #[test]
    fn tiny_k_rejected() {
        let cfg = FingerprintConfig {
            k: 1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(FingerprintError::InvalidK { k: 1 })));
    }

    #[test]
    fn zero_window_rejected() {
        let cfg = FingerprintConfig {
            w: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(FingerprintError::InvalidW { w: 0 })));
    }
}
