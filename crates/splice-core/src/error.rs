//! Error types for splice-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for splice-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in splice-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The external interpreter could not be started.
    #[error("failed to start interpreter '{program}': {message}")]
    Spawn { program: String, message: String },

    /// Communication with a running session failed.
    #[error("session error: {0}")]
    Session(String),

    /// Settings blob could not be read or written.
    #[error("settings error at {path}: {message}")]
    Settings { path: PathBuf, message: String },

    /// The output-cleaning pattern is not a valid regular expression.
    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The interpreter argument string has unbalanced quotes or a dangling escape.
    #[error("invalid shell arguments: {0}")]
    Arguments(#[from] shell_words::ParseError),

    /// The active document could not be read.
    #[error("failed to read document {path}: {message}")]
    Document { path: String, message: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get a short recovery hint suitable for a user-facing notice.
    pub fn with_hint(&self) -> String {
        match self {
            Error::Spawn { .. } => format!("{}\nCheck the shell path and arguments in settings.", self),
            Error::Arguments(_) => format!("{}\nCheck the quoting of the shell arguments in settings.", self),
            Error::Pattern(_) => format!("{}\nFix the output-cleaning pattern in settings.", self),
            Error::Settings { .. } => {
                format!("{}\nDelete the settings file to fall back to defaults.", self)
            }
            _ => self.to_string(),
        }
    }
}
