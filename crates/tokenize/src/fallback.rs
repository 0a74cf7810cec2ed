//! Whitespace + punctuation fallback tokenizer.
//!
//! Used for languages without a grammar and as the downgrade path when a
//! grammar lex fails. It never errors: any byte sequence produces a token
//! stream. Identifier/number/string collapsing still applies so fallback
//! streams remain comparable under renaming and literal edits.

use crate::token::{Token, TokenKind, IDENT, NUM, STR};

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize arbitrary text without a grammar.
pub fn fallback_tokenize(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < content.len() {
        let c = match content[i..].chars().next() {
            Some(c) => c,
            None => break,
        };

        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        if c == '"' || c == '\'' {
            let start = i;
            i += c.len_utf8();
            while i < content.len() {
                let ch = content[i..].chars().next().unwrap();
                i += ch.len_utf8();
                if ch == '\\' && i < content.len() {
                    i += content[i..].chars().next().map_or(0, |c| c.len_utf8());
                } else if ch == c {
                    break;
                }
            }
            // An unterminated quote swallows the rest of the file; the
            // fallback must not fail on it.
            tokens.push(Token::new(TokenKind::Str, STR, start, i));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            i += c.len_utf8();
            while i < content.len() {
                let ch = content[i..].chars().next().unwrap();
                if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Number, NUM, start, i));
            continue;
        }

        if is_word_start(c) {
            let start = i;
            i += c.len_utf8();
            while i < content.len() {
                let ch = content[i..].chars().next().unwrap();
                if is_word_continue(ch) {
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Ident, IDENT, start, i));
            continue;
        }

        let start = i;
        i += c.len_utf8();
        let kind = if matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' | ':') {
            TokenKind::Punct
        } else {
            TokenKind::Op
        };
        tokens.push(Token::new(kind, c.to_string(), start, i));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn words_collapse_to_ident() {
        let tokens = fallback_tokenize("alpha beta_2 gamma");
        assert_eq!(canonical(&tokens), vec![IDENT, IDENT, IDENT]);
    }

    #[test]
    fn numbers_and_strings_collapse() {
        let tokens = fallback_tokenize("count: 42 name: \"x\"");
        assert_eq!(canonical(&tokens), vec![IDENT, ":", NUM, IDENT, ":", STR]);
    }

    #[test]
    fn unterminated_quote_never_errors() {
        let tokens = fallback_tokenize("say \"unclosed");
        assert_eq!(canonical(&tokens), vec![IDENT, STR]);
        assert_eq!(tokens.last().unwrap().end as usize, "say \"unclosed".len());
    }

    #[test]
    fn punctuation_is_kept_verbatim() {
        let tokens = fallback_tokenize("{a, b}");
        assert_eq!(canonical(&tokens), vec!["{", IDENT, ",", IDENT, "}"]);
    }

    #[test]
    fn empty_and_whitespace_only_input() {
        assert!(fallback_tokenize("").is_empty());
        assert!(fallback_tokenize("  \n\t ").is_empty());
    }

    #[test]
    fn deterministic_across_runs() {
        let text = "key = [1, 2, 'three']";
        assert_eq!(fallback_tokenize(text), fallback_tokenize(text));
    }
}
