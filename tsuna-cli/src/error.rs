//! CLI error type.

use std::path::PathBuf;

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors surfaced to the terminal.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A client, config or read error.
    #[error(transparent)]
    Client(#[from] tsuna::Error),

    /// The calls file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The calls file is not valid JSON.
    #[error("invalid calls file: {0}")]
    Json(#[from] serde_json::Error),

    /// A call in the calls file cannot be built.
    #[error("call #{index}: {message}")]
    Call { index: usize, message: String },
}

impl CliError {
    /// Create a call error for the request at `index`.
    pub fn call(index: usize, message: impl Into<String>) -> Self {
        Self::Call {
            index,
            message: message.into(),
        }
    }
}
