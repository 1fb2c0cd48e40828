use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate a conntop run.
///
/// Everything travels as `anyhow::Error`; `main` downcasts to this type to
/// choose between the usage and general-failure exit codes.
#[derive(Debug, Error)]
pub enum ConntopError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid address filter '{value}': {reason}")]
    InvalidFilter { value: String, reason: String },
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decompressor '{command}' failed: {detail}")]
    Decompressor { command: String, detail: String },
    #[error("{0}")]
    UnsupportedArchive(String),
    #[error("{stage} worker panicked")]
    StagePanicked { stage: &'static str },
    #[error("{stage} output queue closed before all work was delivered")]
    StageDisconnected { stage: &'static str },
}

impl ConntopError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error stems from how conntop was invoked rather than from the input.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidFilter { .. })
    }
}
