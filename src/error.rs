use thiserror::Error;

/// Rule-level outcome for a line that did not produce a rule.
///
/// The three `Skip*` variants are soft: the builder reports them to its
/// diagnostic sink and keeps going. `ParseFailure` aborts the whole build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Commented rules are skipped")]
    SkipComment,

    #[error("HTML rules are skipped")]
    SkipUnsupportedSyntax,

    #[error("Unsupported option rules are skipped: {0}")]
    SkipUnsupportedOption(String),

    #[error("Cannot parse rule: {0}")]
    ParseFailure(String),
}

impl RuleError {
    /// Whether the builder may drop the line and continue.
    pub fn is_skip(&self) -> bool {
        !matches!(self, RuleError::ParseFailure(_))
    }
}

/// Filter engine error types
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Parse error at line {line} ({text:?}): {message}")]
    ParseErrorAtLine {
        line: usize,
        text: String,
        message: String,
    },

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;
