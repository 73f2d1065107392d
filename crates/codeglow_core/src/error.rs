//! Error types for engine acquisition, tokenization and scheduling.
use thiserror::Error;

/// Top-level highlighting error type.
///
/// Language and theme resolution never produce these; they always degrade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HighlightError {
    #[error(
        "No highlighter instance supplied; the core entry point requires `options.highlighter`"
    )]
    MissingEngine,

    #[error("Language not found: {0}")]
    LanguageNotFound(String),

    #[error("Theme not found: {0}")]
    ThemeNotFound(String),

    #[error("Invalid grammar '{name}': {message}")]
    InvalidGrammar { name: String, message: String },

    #[error("Invalid theme '{name}': {message}")]
    InvalidTheme { name: String, message: String },

    #[error("Tokenize error: {0}")]
    Tokenize(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Engine state is poisoned")]
    Poisoned,
}

impl HighlightError {
    /// Whether the provisioning layer should retry with plaintext only.
    ///
    /// # Returns
    /// `true` for unknown languages and grammars that fail to compile.
    pub fn is_language_failure(&self) -> bool {
        matches!(
            self,
            Self::LanguageNotFound(_) | Self::InvalidGrammar { .. }
        )
    }
}

impl From<tokio::task::JoinError> for HighlightError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(value.to_string())
    }
}
