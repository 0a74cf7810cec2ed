//! Spec-driven lexer for grammar-backed languages.
//!
//! One [`LangSpec`] row describes each language: its keyword set, comment
//! markers and string delimiters. The lexer itself is a single O(n) scan
//! shared by all of them, which keeps token emission deterministic across
//! languages and makes adding a language a data change, not a code change.
//!
//! Canonicalization rules applied at emission:
//! 1. whitespace and comments are dropped,
//! 2. identifiers collapse to `IDENT`, numbers to `NUM`, string/char
//!    literals to `STR`,
//! 3. keywords, operators and punctuation keep their verbatim text,
//! 4. byte spans always reference the original lexeme.

use thiserror::Error;

use crate::token::{Token, TokenKind, IDENT, NUM, STR};
use crate::Language;

/// Errors that abort a grammar lex and downgrade the file to the fallback
/// tokenizer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string literal starting at byte {at}")]
    UnterminatedString { at: usize },
    #[error("unterminated block comment starting at byte {at}")]
    UnterminatedComment { at: usize },
}

/// Static description of a language's surface grammar.
pub struct LangSpec {
    pub keywords: &'static [&'static str],
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
    pub nested_block_comments: bool,
    pub string_delims: &'static [char],
    /// Python-style `'''`/`"""` long strings.
    pub triple_quotes: bool,
    /// SQL-style case folding for keyword lookup only; emitted text stays
    /// verbatim.
    pub case_insensitive_keywords: bool,
}

/// Multi-character operators, longest first so greedy matching is correct.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "===", "!==", "**=", "...", "..=", "<=>", "->", "=>", "::", "==", "!=", "<=",
    ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>",
    "**", "//", "..", ":=", "<-", "|>",
];

const PUNCT: &[char] = &['(', ')', '[', ']', '{', '}', ',', ';', ':'];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Lex `content` according to `spec`, returning canonical tokens with
/// comments already dropped.
pub fn lex(content: &str, spec: &LangSpec) -> Result<Vec<Token>, LexError> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    'outer: while i < content.len() {
        let c = match content[i..].chars().next() {
            Some(c) => c,
            None => break,
        };

        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        // Block comments before line comments: Lua's `--[[` must not be
        // swallowed by its `--` line marker.
        for (open, close) in spec.block_comments {
            if content[i..].starts_with(open) {
                let start = i;
                i += open.len();
                let mut depth = 1usize;
                while depth > 0 {
                    if i >= content.len() {
                        return Err(LexError::UnterminatedComment { at: start });
                    }
                    if spec.nested_block_comments && content[i..].starts_with(open) {
                        depth += 1;
                        i += open.len();
                    } else if content[i..].starts_with(close) {
                        depth -= 1;
                        i += close.len();
                    } else {
                        i += content[i..].chars().next().map_or(1, |c| c.len_utf8());
                    }
                }
                continue 'outer;
            }
        }

        for marker in spec.line_comments {
            if content[i..].starts_with(marker) {
                while i < content.len() && bytes[i] != b'\n' {
                    i += content[i..].chars().next().map_or(1, |c| c.len_utf8());
                }
                continue 'outer;
            }
        }

        if spec.string_delims.contains(&c) {
            let start = i;
            let delim = c;
            let triple = spec.triple_quotes
                && content[i..].len() >= 3
                && content[i..].chars().take(3).all(|ch| ch == delim);
            if triple {
                i += 3 * delim.len_utf8();
                let closer: String = std::iter::repeat(delim).take(3).collect();
                match content[i..].find(&closer) {
                    Some(offset) => i += offset + closer.len(),
                    None => return Err(LexError::UnterminatedString { at: start }),
                }
            } else {
                i += delim.len_utf8();
                loop {
                    if i >= content.len() {
                        return Err(LexError::UnterminatedString { at: start });
                    }
                    let ch = content[i..].chars().next().unwrap();
                    i += ch.len_utf8();
                    if ch == '\\' && i < content.len() {
                        i += content[i..].chars().next().map_or(0, |c| c.len_utf8());
                    } else if ch == delim {
                        break;
                    }
                }
            }
            tokens.push(Token::new(TokenKind::Str, STR, start, i));
            continue;
        }

        let next_is_digit = content[i + c.len_utf8()..]
            .chars()
            .next()
            .is_some_and(|n| n.is_ascii_digit());
        if c.is_ascii_digit() || (c == '.' && next_is_digit) {
            let start = i;
            i += c.len_utf8();
            let mut prev = c;
            while i < content.len() {
                let ch = content[i..].chars().next().unwrap();
                let exponent_sign =
                    (ch == '+' || ch == '-') && (prev == 'e' || prev == 'E');
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || exponent_sign {
                    prev = ch;
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Number, NUM, start, i));
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            i += c.len_utf8();
            while i < content.len() {
                let ch = content[i..].chars().next().unwrap();
                if is_ident_continue(ch) {
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
            let word = &content[start..i];
            let is_keyword = if spec.case_insensitive_keywords {
                let folded = word.to_ascii_lowercase();
                spec.keywords.contains(&folded.as_str())
            } else {
                spec.keywords.contains(&word)
            };
            if is_keyword {
                tokens.push(Token::new(TokenKind::Keyword, word, start, i));
            } else {
                tokens.push(Token::new(TokenKind::Ident, IDENT, start, i));
            }
            continue;
        }

        if let Some(op) = OPERATORS.iter().find(|op| content[i..].starts_with(**op)) {
            tokens.push(Token::new(TokenKind::Op, *op, i, i + op.len()));
            i += op.len();
            continue;
        }

        let start = i;
        i += c.len_utf8();
        if PUNCT.contains(&c) {
            tokens.push(Token::new(TokenKind::Punct, c.to_string(), start, i));
        } else {
            tokens.push(Token::new(TokenKind::Op, c.to_string(), start, i));
        }
    }

    Ok(tokens)
}

macro_rules! spec {
    (
        keywords: $kw:expr,
        line: $line:expr,
        block: $block:expr,
        nested: $nested:expr,
        strings: $strings:expr,
        triple: $triple:expr,
        fold: $fold:expr
    ) => {
        LangSpec {
            keywords: $kw,
            line_comments: $line,
            block_comments: $block,
            nested_block_comments: $nested,
            string_delims: $strings,
            triple_quotes: $triple,
            case_insensitive_keywords: $fold,
        }
    };
}

static PYTHON: LangSpec = spec!(
    keywords: &[
        "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
        "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
        "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
        "try", "while", "with", "yield",
    ],
    line: &["#"],
    block: &[],
    nested: false,
    strings: &['"', '\''],
    triple: true,
    fold: false
);

static JAVA: LangSpec = spec!(
    keywords: &[
        "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
        "const", "continue", "default", "do", "double", "else", "enum", "extends", "final",
        "finally", "float", "for", "if", "implements", "import", "instanceof", "int", "interface",
        "long", "native", "new", "package", "private", "protected", "public", "record", "return",
        "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
        "throws", "transient", "try", "var", "void", "volatile", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static JAVASCRIPT: LangSpec = spec!(
    keywords: &[
        "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
        "default", "delete", "do", "else", "export", "extends", "false", "finally", "for",
        "function", "if", "import", "in", "instanceof", "let", "new", "null", "of", "return",
        "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined",
        "var", "void", "while", "with", "yield",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\'', '`'],
    triple: false,
    fold: false
);

static TYPESCRIPT: LangSpec = spec!(
    keywords: &[
        "abstract", "any", "as", "async", "await", "boolean", "break", "case", "catch", "class",
        "const", "continue", "declare", "default", "delete", "do", "else", "enum", "export",
        "extends", "false", "finally", "for", "function", "if", "implements", "import", "in",
        "instanceof", "interface", "let", "namespace", "never", "new", "null", "number", "of",
        "private", "protected", "public", "readonly", "return", "static", "string", "super",
        "switch", "this", "throw", "true", "try", "type", "typeof", "undefined", "unknown",
        "var", "void", "while", "yield",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\'', '`'],
    triple: false,
    fold: false
);

static C_LANG: LangSpec = spec!(
    keywords: &[
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "void", "volatile", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static CPP: LangSpec = spec!(
    keywords: &[
        "auto", "bool", "break", "case", "catch", "char", "class", "const", "constexpr",
        "continue", "default", "delete", "do", "double", "else", "enum", "explicit", "extern",
        "false", "final", "float", "for", "friend", "goto", "if", "inline", "int", "long",
        "mutable", "namespace", "new", "noexcept", "nullptr", "operator", "override", "private",
        "protected", "public", "return", "short", "signed", "sizeof", "static", "struct",
        "switch", "template", "this", "throw", "true", "try", "typedef", "typename", "union",
        "unsigned", "using", "virtual", "void", "volatile", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static CSHARP: LangSpec = spec!(
    keywords: &[
        "abstract", "as", "async", "await", "base", "bool", "break", "byte", "case", "catch",
        "char", "checked", "class", "const", "continue", "decimal", "default", "delegate", "do",
        "double", "else", "enum", "event", "explicit", "extern", "false", "finally", "float",
        "for", "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is",
        "lock", "long", "namespace", "new", "null", "object", "operator", "out", "override",
        "params", "private", "protected", "public", "readonly", "record", "ref", "return",
        "sbyte", "sealed", "short", "sizeof", "static", "string", "struct", "switch", "this",
        "throw", "true", "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort",
        "using", "var", "virtual", "void", "volatile", "while", "yield",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static GO: LangSpec = spec!(
    keywords: &[
        "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
        "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
        "return", "select", "struct", "switch", "type", "var",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '`', '\''],
    triple: false,
    fold: false
);

static RUST: LangSpec = spec!(
    keywords: &[
        "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
        "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod",
        "move", "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait",
        "true", "type", "unsafe", "use", "where", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: true,
    // Lifetimes make a bare apostrophe ambiguous; char literals lex as
    // operator + identifier instead.
    strings: &['"'],
    triple: false,
    fold: false
);

static RUBY: LangSpec = spec!(
    keywords: &[
        "BEGIN", "END", "alias", "and", "begin", "break", "case", "class", "def", "defined?",
        "do", "else", "elsif", "end", "ensure", "false", "for", "if", "in", "module", "next",
        "nil", "not", "or", "redo", "rescue", "retry", "return", "self", "super", "then", "true",
        "undef", "unless", "until", "when", "while", "yield",
    ],
    line: &["#"],
    block: &[("=begin", "=end")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static PHP: LangSpec = spec!(
    keywords: &[
        "abstract", "and", "array", "as", "break", "callable", "case", "catch", "class", "clone",
        "const", "continue", "declare", "default", "do", "echo", "else", "elseif", "empty",
        "enum", "extends", "final", "finally", "fn", "for", "foreach", "function", "global",
        "goto", "if", "implements", "include", "instanceof", "interface", "isset", "list",
        "match", "namespace", "new", "or", "print", "private", "protected", "public", "readonly",
        "require", "return", "static", "switch", "throw", "trait", "try", "unset", "use", "var",
        "while", "xor", "yield",
    ],
    line: &["//", "#"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static KOTLIN: LangSpec = spec!(
    keywords: &[
        "abstract", "as", "break", "by", "catch", "class", "companion", "const", "continue",
        "data", "do", "else", "enum", "false", "final", "finally", "for", "fun", "if", "import",
        "in", "init", "interface", "internal", "is", "lateinit", "null", "object", "open",
        "override", "package", "private", "protected", "public", "return", "sealed", "super",
        "suspend", "this", "throw", "true", "try", "typealias", "val", "var", "when", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: true,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static SWIFT: LangSpec = spec!(
    keywords: &[
        "as", "break", "case", "catch", "class", "continue", "default", "defer", "deinit", "do",
        "else", "enum", "extension", "fallthrough", "false", "fileprivate", "for", "func",
        "guard", "if", "import", "in", "init", "inout", "internal", "is", "let", "nil", "open",
        "private", "protocol", "public", "repeat", "rethrows", "return", "self", "static",
        "struct", "subscript", "super", "switch", "throw", "throws", "true", "try", "typealias",
        "var", "where", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: true,
    strings: &['"'],
    triple: false,
    fold: false
);

static SCALA: LangSpec = spec!(
    keywords: &[
        "abstract", "case", "catch", "class", "def", "do", "else", "enum", "extends", "false",
        "final", "finally", "for", "given", "if", "implicit", "import", "lazy", "match", "new",
        "null", "object", "override", "package", "private", "protected", "return", "sealed",
        "super", "then", "this", "throw", "trait", "true", "try", "type", "val", "var", "while",
        "with", "yield",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: true,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static SHELL: LangSpec = spec!(
    keywords: &[
        "case", "do", "done", "elif", "else", "esac", "fi", "for", "function", "if", "in",
        "local", "return", "select", "then", "until", "while",
    ],
    line: &["#"],
    block: &[],
    nested: false,
    strings: &['"', '\'', '`'],
    triple: false,
    fold: false
);

static HASKELL: LangSpec = spec!(
    keywords: &[
        "case", "class", "data", "default", "deriving", "do", "else", "foreign", "if", "import",
        "in", "infix", "infixl", "infixr", "instance", "let", "module", "newtype", "of", "then",
        "type", "where",
    ],
    line: &["--"],
    block: &[("{-", "-}")],
    nested: true,
    strings: &['"'],
    triple: false,
    fold: false
);

static LUA: LangSpec = spec!(
    keywords: &[
        "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
        "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    ],
    line: &["--"],
    block: &[("--[[", "]]")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static PERL: LangSpec = spec!(
    keywords: &[
        "do", "else", "elsif", "for", "foreach", "if", "last", "local", "my", "next", "our",
        "package", "return", "sub", "unless", "until", "use", "while",
    ],
    line: &["#"],
    block: &[],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static R_LANG: LangSpec = spec!(
    keywords: &[
        "FALSE", "Inf", "NA", "NULL", "NaN", "TRUE", "break", "else", "for", "function", "if",
        "in", "next", "repeat", "while",
    ],
    line: &["#"],
    block: &[],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static MATLAB: LangSpec = spec!(
    keywords: &[
        "break", "case", "catch", "classdef", "continue", "else", "elseif", "end", "for",
        "function", "global", "if", "otherwise", "parfor", "persistent", "return", "switch",
        "try", "while",
    ],
    line: &["%"],
    block: &[("%{", "%}")],
    nested: false,
    strings: &['\'', '"'],
    triple: false,
    fold: false
);

static OBJECTIVE_C: LangSpec = spec!(
    keywords: &[
        "BOOL", "NO", "YES", "auto", "break", "case", "char", "const", "continue", "default",
        "do", "double", "else", "enum", "extern", "float", "for", "goto", "id", "if", "int",
        "long", "nil", "return", "self", "short", "signed", "sizeof", "static", "struct",
        "super", "switch", "typedef", "union", "unsigned", "void", "volatile", "while",
    ],
    line: &["//"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['"', '\''],
    triple: false,
    fold: false
);

static SQL: LangSpec = spec!(
    keywords: &[
        "all", "alter", "and", "as", "asc", "between", "by", "case", "create", "delete", "desc",
        "distinct", "drop", "else", "end", "exists", "from", "group", "having", "in", "index",
        "inner", "insert", "into", "is", "join", "left", "like", "limit", "not", "null", "on",
        "or", "order", "outer", "primary", "right", "select", "set", "table", "then", "union",
        "update", "values", "view", "when", "where",
    ],
    line: &["--"],
    block: &[("/*", "*/")],
    nested: false,
    strings: &['\'', '"'],
    triple: false,
    fold: true
);

/// Look up the lexer spec for a language; `None` means the fallback
/// tokenizer is the only option.
pub fn spec_for(lang: Language) -> Option<&'static LangSpec> {
    match lang {
        Language::Python => Some(&PYTHON),
        Language::Java => Some(&JAVA),
        Language::JavaScript => Some(&JAVASCRIPT),
        Language::TypeScript => Some(&TYPESCRIPT),
        Language::C => Some(&C_LANG),
        Language::Cpp => Some(&CPP),
        Language::CSharp => Some(&CSHARP),
        Language::Go => Some(&GO),
        Language::Rust => Some(&RUST),
        Language::Ruby => Some(&RUBY),
        Language::Php => Some(&PHP),
        Language::Kotlin => Some(&KOTLIN),
        Language::Swift => Some(&SWIFT),
        Language::Scala => Some(&SCALA),
        Language::Shell => Some(&SHELL),
        Language::Haskell => Some(&HASKELL),
        Language::Lua => Some(&LUA),
        Language::Perl => Some(&PERL),
        Language::R => Some(&R_LANG),
        Language::Matlab => Some(&MATLAB),
        Language::ObjectiveC => Some(&OBJECTIVE_C),
        Language::Sql => Some(&SQL),
        _ => None,
    }
}
