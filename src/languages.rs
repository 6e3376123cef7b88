//! Supported language set.

use std::fmt;

/// A language the server can compile and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Python,
    Java,
}

impl Language {
    /// Look up a language by name, case-insensitively, accepting the common
    /// aliases clients use.
    pub fn parse(name: &str) -> Option<Language> {
        match name.to_lowercase().as_str() {
            "c" => Some(Language::C),
            "c++" | "cpp" => Some(Language::Cpp),
            "python" | "py" | "python3" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    /// Canonical names of all supported languages.
    pub fn supported() -> &'static [&'static str] {
        &["c", "c++", "python", "java"]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::C => "c",
            Language::Cpp => "c++",
            Language::Python => "python",
            Language::Java => "java",
        };
        write!(f, "{}", s)
    }
}
