//! Canonical token types shared by every tokenizer.
//!
//! A [`Token`] carries a kind from a closed set, the canonical lexeme, and
//! the byte span of the original lexeme in the source file. Canonicalization
//! happens at emission time: identifier-class tokens collapse to `IDENT`,
//! numeric literals to `NUM`, string and character literals to `STR`, while
//! keywords, operators and punctuation keep their verbatim text. Whitespace
//! and comments never reach the stream.
//!
//! # Byte offsets
//!
//! `start` and `end` are byte positions in the source file, not character
//! positions, so downstream match regions can be mapped back onto the raw
//! bytes without re-tokenizing.

use serde::{Deserialize, Serialize};

/// Collapsed lexeme for identifier-class tokens.
pub const IDENT: &str = "IDENT";
/// Collapsed lexeme for numeric literals.
pub const NUM: &str = "NUM";
/// Collapsed lexeme for string and character literals.
pub const STR: &str = "STR";

/// Closed set of token kinds produced by every tokenizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Identifier-class token, canonical lexeme is always [`IDENT`].
    Ident,
    /// Language keyword, kept verbatim.
    Keyword,
    /// Numeric literal, canonical lexeme is always [`NUM`].
    Number,
    /// String or character literal, canonical lexeme is always [`STR`].
    Str,
    /// Operator, kept verbatim.
    Op,
    /// Punctuation, kept verbatim.
    Punct,
    /// Comment; part of the closed kind set for stream consumers, never
    /// emitted by the bundled tokenizers (comments are dropped during
    /// scanning).
    Comment,
}

impl TokenKind {
    /// Stable single-byte discriminant used by the canonical byte encoding.
    pub const fn discriminant(self) -> u8 {
        match self {
            TokenKind::Ident => 0,
            TokenKind::Keyword => 1,
            TokenKind::Number => 2,
            TokenKind::Str => 3,
            TokenKind::Op => 4,
            TokenKind::Punct => 5,
            TokenKind::Comment => 6,
        }
    }

    fn from_discriminant(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TokenKind::Ident),
            1 => Some(TokenKind::Keyword),
            2 => Some(TokenKind::Number),
            3 => Some(TokenKind::Str),
            4 => Some(TokenKind::Op),
            5 => Some(TokenKind::Punct),
            6 => Some(TokenKind::Comment),
            _ => None,
        }
    }
}

/// A canonical token with its UTF-8 byte offsets in the source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Token kind from the closed set.
    pub kind: TokenKind,
    /// Canonical lexeme: collapsed placeholder or verbatim text.
    pub text: String,
    /// Byte offset (inclusive) of the original lexeme.
    pub start: u32,
    /// Byte offset (exclusive) of the original lexeme.
    pub end: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            start: start as u32,
            end: end as u32,
        }
    }

    /// The single stable byte encoding of a canonical token.
    ///
    /// Layout: one discriminant byte followed by the canonical lexeme bytes.
    /// This encoding feeds the k-gram hash, so it is part of the store's
    /// schema version and must never change silently.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.text.len());
        out.push(self.kind.discriminant());
        out.extend_from_slice(self.text.as_bytes());
        out
    }

    /// Decode the `(kind, lexeme)` pair from [`Token::canonical_bytes`] output.
    pub fn decode_canonical(bytes: &[u8]) -> Option<(TokenKind, &str)> {
        let (&disc, rest) = bytes.split_first()?;
        let kind = TokenKind::from_discriminant(disc)?;
        let text = std::str::from_utf8(rest).ok()?;
        Some((kind, text))
    }

    /// Byte range `[start, end)` as a tuple.
    pub fn range(&self) -> (u32, u32) {
        (self.start, self.end)
    }
}

/// Ordered canonical token sequence for one source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenStream {
    /// Repository-relative path of the source file.
    pub path: String,
    /// Language tag assigned by the classifier.
    pub language: crate::Language,
    /// Tokens in source order, comments and whitespace already dropped.
    pub tokens: Vec<Token>,
}

impl TokenStream {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
