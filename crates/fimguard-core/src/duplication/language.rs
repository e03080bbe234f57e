//! Language families and comment stripping
//!
//! Code is treated as text. A language id only selects which comment
//! markers, string quotes and keywords apply; unknown ids fall back to a
//! generic family that strips nothing.

use serde::{Deserialize, Serialize};

/// Group of languages sharing comment and quoting conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageFamily {
    /// `//` and `/* */` comments
    CLike,
    /// `#` comments, triple-quoted strings
    Python,
    /// `#` comments (shell, ruby, yaml, ...)
    HashComment,
    /// `--` comments (sql, lua, haskell)
    DashComment,
    /// `<!-- -->` comments
    Markup,
    /// No comment syntax assumed
    Generic,
}

const C_LIKE_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "break", "case", "catch", "class", "const", "continue",
    "default", "defer", "delete", "do", "else", "enum", "export", "extends", "false", "final",
    "finally", "fn", "for", "func", "function", "go", "if", "impl", "implements", "import", "in",
    "instanceof", "interface", "let", "loop", "match", "mod", "mut", "namespace", "new", "null",
    "package", "private", "protected", "pub", "public", "return", "self", "static", "struct",
    "super", "switch", "this", "throw", "throws", "trait", "true", "try", "type", "typeof",
    "undefined", "use", "using", "var", "void", "where", "while", "yield",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "self",
    "try", "while", "with", "yield",
];

const SCRIPT_KEYWORDS: &[&str] = &[
    "begin", "case", "def", "do", "done", "elif", "else", "end", "esac", "fi", "for", "function",
    "if", "in", "local", "module", "nil", "return", "then", "unless", "until", "while",
];

const QUERY_KEYWORDS: &[&str] = &[
    "and", "by", "create", "delete", "do", "else", "end", "from", "function", "group", "if",
    "in", "insert", "into", "join", "local", "nil", "not", "or", "order", "return", "select",
    "set", "table", "then", "update", "values", "where", "with",
];

impl LanguageFamily {
    /// Map a free-form language id (editor style) to a family
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "javascript" | "javascriptreact" | "js" | "jsx" | "typescript" | "typescriptreact"
            | "ts" | "tsx" | "java" | "c" | "cpp" | "c++" | "h" | "hpp" | "csharp" | "cs" | "go"
            | "rust" | "rs" | "kotlin" | "kt" | "swift" | "php" | "scala" | "dart" | "objective-c"
            | "objc" | "css" | "scss" | "less" | "groovy" | "zig" => Self::CLike,
            "python" | "py" | "python3" | "jupyter" => Self::Python,
            "shellscript" | "shell" | "sh" | "bash" | "zsh" | "ruby" | "rb" | "perl" | "pl" | "r"
            | "yaml" | "yml" | "toml" | "makefile" | "dockerfile" | "powershell" | "elixir"
            | "ex" | "julia" => Self::HashComment,
            "sql" | "lua" | "haskell" | "hs" | "ada" | "plsql" => Self::DashComment,
            "html" | "xml" | "svg" | "vue" | "svelte" | "markdown" | "md" => Self::Markup,
            _ => Self::Generic,
        }
    }

    pub fn line_comment(&self) -> Option<&'static str> {
        match self {
            Self::CLike => Some("//"),
            Self::Python | Self::HashComment => Some("#"),
            Self::DashComment => Some("--"),
            Self::Markup | Self::Generic => None,
        }
    }

    pub fn block_comment(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::CLike => Some(("/*", "*/")),
            Self::Markup => Some(("<!--", "-->")),
            _ => None,
        }
    }

    fn quotes(&self) -> &'static [char] {
        match self {
            Self::CLike => &['"', '\'', '`'],
            Self::Python | Self::HashComment | Self::DashComment => &['"', '\''],
            Self::Markup | Self::Generic => &[],
        }
    }

    /// Whether `word` is a keyword of this family.
    ///
    /// The generic family accepts the keywords of every family.
    pub fn is_keyword(&self, word: &str) -> bool {
        match self {
            Self::CLike => C_LIKE_KEYWORDS.contains(&word),
            Self::Python => PYTHON_KEYWORDS.contains(&word),
            Self::HashComment => SCRIPT_KEYWORDS.contains(&word),
            Self::DashComment => QUERY_KEYWORDS.contains(&word.to_ascii_lowercase().as_str()),
            Self::Markup => false,
            Self::Generic => {
                C_LIKE_KEYWORDS.contains(&word)
                    || PYTHON_KEYWORDS.contains(&word)
                    || SCRIPT_KEYWORDS.contains(&word)
            }
        }
    }

    /// Remove comments, keeping string literals and line structure intact.
    ///
    /// Strings end at the closing quote or at a newline (backtick strings may
    /// span lines), which keeps stray apostrophes from swallowing code.
    pub fn strip_comments(&self, code: &str) -> String {
        let line = self.line_comment();
        let block = self.block_comment();
        if line.is_none() && block.is_none() {
            return code.to_string();
        }

        let quotes = self.quotes();
        let mut out = String::with_capacity(code.len());
        let mut rest = code;
        let mut quote: Option<char> = None;

        while let Some(c) = rest.chars().next() {
            if let Some(q) = quote {
                out.push(c);
                rest = &rest[c.len_utf8()..];
                if c == '\\' {
                    if let Some(escaped) = rest.chars().next() {
                        out.push(escaped);
                        rest = &rest[escaped.len_utf8()..];
                    }
                } else if c == q || (c == '\n' && q != '`') {
                    quote = None;
                }
                continue;
            }

            if let Some((open, close)) = block {
                if rest.starts_with(open) {
                    let body_end = rest[open.len()..]
                        .find(close)
                        .map(|end| open.len() + end + close.len())
                        .unwrap_or(rest.len());
                    out.extend(rest[..body_end].chars().filter(|&ch| ch == '\n'));
                    rest = &rest[body_end..];
                    continue;
                }
            }

            if let Some(marker) = line {
                if rest.starts_with(marker) {
                    let end = rest.find('\n').unwrap_or(rest.len());
                    rest = &rest[end..];
                    continue;
                }
            }

            if quotes.contains(&c) {
                quote = Some(c);
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        out
    }

    /// Normalize one line: drop comments and collapse whitespace
    pub fn normalize_line(&self, line: &str) -> String {
        let stripped = self.strip_comments(line);
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for LanguageFamily {
    fn default() -> Self {
        Self::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lookup() {
        assert_eq!(LanguageFamily::from_id("TypeScript"), LanguageFamily::CLike);
        assert_eq!(LanguageFamily::from_id("python"), LanguageFamily::Python);
        assert_eq!(LanguageFamily::from_id("bash"), LanguageFamily::HashComment);
        assert_eq!(LanguageFamily::from_id("sql"), LanguageFamily::DashComment);
        assert_eq!(LanguageFamily::from_id("brainfudge"), LanguageFamily::Generic);
        assert_eq!(LanguageFamily::from_id(""), LanguageFamily::Generic);
    }

    #[test]
    fn test_strip_c_like_comments() {
        let code = "let a = 1; // one\n/* block\n comment */let b = \"// not a comment\";";
        let stripped = LanguageFamily::CLike.strip_comments(code);
        assert_eq!(stripped, "let a = 1; \n\nlet b = \"// not a comment\";");
    }

    #[test]
    fn test_strip_python_comments() {
        let code = "x = '#literal'  # trailing\n# full line\ny = 2";
        let stripped = LanguageFamily::Python.strip_comments(code);
        assert_eq!(stripped, "x = '#literal'  \n\ny = 2");
    }

    #[test]
    fn test_lifetime_apostrophe_does_not_swallow_lines() {
        let code = "fn f<'a>(x: &'a str) {}\n// gone\nlet y = 1;";
        let stripped = LanguageFamily::CLike.strip_comments(code);
        assert!(!stripped.contains("gone"));
        assert!(stripped.contains("let y = 1;"));
    }

    #[test]
    fn test_generic_keeps_everything() {
        let code = "a // b # c";
        assert_eq!(LanguageFamily::Generic.strip_comments(code), code);
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(
            LanguageFamily::CLike.normalize_line("   return   x +  1;   // done"),
            "return x + 1;"
        );
    }
}
