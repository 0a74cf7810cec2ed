//! File classification: language assignment, binary and oversize exclusion.
//!
//! Classification looks only at the path and the first few KiB of content,
//! so it stays cheap enough to run on every file of a large tree before any
//! tokenization work is scheduled.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Language;

/// How many leading bytes participate in binary sniffing.
pub const SNIFF_WINDOW: usize = 4096;

/// NUL-byte ratio (per mille) above which a file counts as binary.
const BINARY_NUL_PER_MILLE: usize = 10;

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifyConfig {
    /// Files larger than this are excluded from tokenization and reported.
    pub per_file_byte_cap: u64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            per_file_byte_cap: 1024 * 1024,
        }
    }
}

/// Classification verdict for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileClass {
    /// Tokenize with the language's grammar (or the fallback when the
    /// language has none).
    Source(Language),
    /// Excluded: binary content.
    Binary,
    /// Excluded: larger than the per-file cap.
    Oversized { size: u64, cap: u64 },
}

/// Classify a file from its path, leading bytes and total size.
///
/// `head` should hold at most the first [`SNIFF_WINDOW`] bytes; passing the
/// whole file works but wastes the caller's memory bandwidth.
pub fn classify(path: &Path, head: &[u8], size: u64, cfg: &ClassifyConfig) -> FileClass {
    if size > cfg.per_file_byte_cap {
        return FileClass::Oversized {
            size,
            cap: cfg.per_file_byte_cap,
        };
    }
    let window = &head[..head.len().min(SNIFF_WINDOW)];
    if looks_binary(window) {
        return FileClass::Binary;
    }

    let lang = match Language::from_path(path) {
        Some(lang) => disambiguate(lang, window),
        None => from_shebang(window).unwrap_or(Language::Text),
    };
    FileClass::Source(lang)
}

fn looks_binary(window: &[u8]) -> bool {
    if window.is_empty() {
        return false;
    }
    let nul_count = window.iter().filter(|&&b| b == 0).count();
    nul_count * 1000 > window.len() * BINARY_NUL_PER_MILLE
}

/// Content rules for extensions the table cannot settle alone.
fn disambiguate(lang: Language, window: &[u8]) -> Language {
    let text = String::from_utf8_lossy(window);
    match lang {
        // `.h` defaults to C; promote to C++ on unmistakable C++ surface.
        Language::C => {
            if ["template<", "template <", "namespace ", "class ", "::"]
                .iter()
                .any(|kw| text.contains(kw))
            {
                Language::Cpp
            } else if text.contains("@interface") || text.contains("#import") {
                Language::ObjectiveC
            } else {
                Language::C
            }
        }
        // `.m` defaults to MATLAB; promote on Objective-C markers.
        Language::Matlab => {
            if text.contains("@interface")
                || text.contains("@implementation")
                || text.contains("#import")
            {
                Language::ObjectiveC
            } else {
                Language::Matlab
            }
        }
        other => other,
    }
}

/// Shebang sniffing for extensionless scripts.
fn from_shebang(window: &[u8]) -> Option<Language> {
    let text = std::str::from_utf8(window).ok()?;
    let first = text.lines().next()?;
    if !first.starts_with("#!") {
        return None;
    }
    let interpreter = first.trim_start_matches("#!").trim();
    if interpreter.contains("python") {
        Some(Language::Python)
    } else if interpreter.contains("ruby") {
        Some(Language::Ruby)
    } else if interpreter.contains("perl") {
        Some(Language::Perl)
    } else if interpreter.contains("node") {
        Some(Language::JavaScript)
    } else if interpreter.ends_with("sh") || interpreter.contains("bash") {
        Some(Language::Shell)
    } else {
        None
    }
}
