//! Language tags and the extension table that assigns them.
//!
//! The table follows the shape of the redesign note in the service design:
//! a closed enum of known languages, a static extension map, and one lexer
//! spec row per language with a grammar. Adding a language is adding a row
//! here plus (optionally) a [`LangSpec`](crate::lexer::LangSpec) entry;
//! everything without a spec falls back to the whitespace tokenizer.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Closed set of language tags the classifier can assign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Java,
    JavaScript,
    TypeScript,
    C,
    Cpp,
    CSharp,
    Go,
    Rust,
    Ruby,
    Php,
    Kotlin,
    Swift,
    Scala,
    Shell,
    Haskell,
    Lua,
    Perl,
    R,
    Matlab,
    ObjectiveC,
    Sql,
    Html,
    Css,
    Json,
    Yaml,
    Toml,
    Xml,
    Markdown,
    Dockerfile,
    Makefile,
    /// Plain or unrecognized text; always uses the fallback tokenizer.
    Text,
}

impl Language {
    /// Short stable tag, used in logs and persisted token streams.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Haskell => "haskell",
            Language::Lua => "lua",
            Language::Perl => "perl",
            Language::R => "r",
            Language::Matlab => "matlab",
            Language::ObjectiveC => "objective_c",
            Language::Sql => "sql",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Xml => "xml",
            Language::Markdown => "markdown",
            Language::Dockerfile => "dockerfile",
            Language::Makefile => "makefile",
            Language::Text => "text",
        }
    }

    /// Assign a language from a path alone. Ambiguous extensions (`.h`,
    /// `.m`) get their default here; content disambiguation happens in
    /// [`classify`](crate::classify::classify).
    pub fn from_path(path: &Path) -> Option<Language> {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            match name {
                "Dockerfile" => return Some(Language::Dockerfile),
                "Makefile" | "makefile" | "GNUmakefile" => return Some(Language::Makefile),
                "CMakeLists.txt" => return Some(Language::Text),
                "Gemfile" | "Rakefile" => return Some(Language::Ruby),
                _ => {}
            }
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Some(match ext.as_str() {
            "py" | "pyi" | "pyw" | "pyx" => Language::Python,
            "java" | "jsp" => Language::Java,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "c" => Language::C,
            "h" => Language::C,
            "cpp" | "cxx" | "cc" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "cs" | "csx" => Language::CSharp,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "rb" | "rbw" | "rake" | "gemspec" => Language::Ruby,
            "php" | "php3" | "php4" | "php5" | "phtml" => Language::Php,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "scala" | "sc" => Language::Scala,
            "sh" | "bash" | "zsh" | "fish" => Language::Shell,
            "hs" | "lhs" => Language::Haskell,
            "lua" => Language::Lua,
            "pl" | "pm" | "perl" => Language::Perl,
            "r" | "rmd" => Language::R,
            "m" => Language::Matlab,
            "mm" => Language::ObjectiveC,
            "sql" | "mysql" | "pgsql" | "plsql" => Language::Sql,
            "html" | "htm" | "xhtml" => Language::Html,
            "css" | "scss" | "sass" | "less" => Language::Css,
            "json" | "jsonc" | "json5" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "xml" | "xsl" | "xslt" | "xsd" | "svg" => Language::Xml,
            "md" | "markdown" | "mdown" | "mkd" | "mdx" => Language::Markdown,
            "dockerfile" => Language::Dockerfile,
            "mk" | "make" => Language::Makefile,
            "txt" | "text" => Language::Text,
            _ => return None,
        })
    }

    /// Whether a grammar-backed lexer exists for this language.
    ///
    /// Markup and data languages always use the fallback tokenizer; their
    /// token structure is too thin to justify a grammar.
    pub fn has_grammar(self) -> bool {
        !matches!(
            self,
            Language::Html
                | Language::Css
                | Language::Json
                | Language::Yaml
                | Language::Toml
                | Language::Xml
                | Language::Markdown
                | Language::Dockerfile
                | Language::Makefile
                | Language::Text
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
