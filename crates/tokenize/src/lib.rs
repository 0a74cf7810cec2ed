//! Language-aware canonicalizing tokenizers for the simscan pipeline.
//!
//! This crate turns a source file into a [`TokenStream`] whose canonical
//! lexemes are invariant under the textual obfuscations the comparator must
//! ignore: identifier renaming, reformatting, and comment edits.
//!
//! # Pipeline position
//!
//! ```text
//! Tree ──▶ Rules ──▶ Classify/Tokenize ──▶ Fingerprint ──▶ Store ──▶ Compare
//!                         ↑
//!                     (this crate)
//! ```
//!
//! # Guarantees
//!
//! - Same bytes + same language ⇒ identical token stream, forever. No I/O,
//!   no locale, no clock.
//! - A grammar lex failure downgrades to the fallback tokenizer and is
//!   reported as a warning; tokenization never fails a file outright.
//! - Every token's byte span lies within the source file and covers the
//!   original lexeme, so match regions can be projected back onto source.

mod classify;
mod fallback;
mod language;
mod lexer;
mod token;

pub use crate::classify::{classify, ClassifyConfig, FileClass, SNIFF_WINDOW};
pub use crate::fallback::fallback_tokenize;
pub use crate::language::Language;
pub use crate::lexer::{lex, spec_for, LangSpec, LexError};
pub use crate::token::{Token, TokenKind, TokenStream, IDENT, NUM, STR};

use serde::{Deserialize, Serialize};

/// Non-fatal report attached to a file whose grammar lex failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenizerWarning {
    /// Repository-relative path of the affected file.
    pub path: String,
    /// Language whose grammar failed.
    pub language: Language,
    /// Human-readable reason; the lex error rendered.
    pub message: String,
}

/// Tokenize one file, downgrading to the fallback tokenizer on lex errors.
///
/// Returns the stream plus an optional warning describing the downgrade.
pub fn tokenize_file(
    path: &str,
    language: Language,
    content: &str,
) -> (TokenStream, Option<TokenizerWarning>) {
    if let Some(spec) = spec_for(language) {
        match lex(content, spec) {
            Ok(tokens) => {
                return (
                    TokenStream {
                        path: path.to_string(),
                        language,
                        tokens,
                    },
                    None,
                );
            }
            Err(err) => {
                let warning = TokenizerWarning {
                    path: path.to_string(),
                    language,
                    message: err.to_string(),
                };
                let stream = TokenStream {
                    path: path.to_string(),
                    language,
                    tokens: fallback_tokenize(content),
                };
                return (stream, Some(warning));
            }
        }
    }

    (
        TokenStream {
            path: path.to_string(),
            language,
            tokens: fallback_tokenize(content),
        },
        None,
    )
}
