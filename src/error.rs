// ============================================================================
// ERRORS: one error type for every editor operation
// ============================================================================

use thiserror::Error;

use crate::session::JobKind;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Debug, Error)]
pub enum EditorError {
    /// Malformed source identifier, empty overlay text, empty AI instruction.
    /// Rejected before any state change.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stale overlay identifier. Session methods swallow this and report
    /// "nothing changed" instead, since delete-then-drag races are expected.
    #[error("overlay not found")]
    NotFound,

    /// Fetch / AI-edit transport or authorization failure, or an
    /// undecodable bitmap.
    #[error("{0}")]
    ResourceUnavailable(String),

    /// Another long-running operation already owns the busy gate.
    #[error("cannot start: {running} is still in progress")]
    ConcurrencyViolation { running: JobKind },

    #[error("no image is loaded")]
    NoImageLoaded,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode failure: {0}")]
    Image(#[from] image::ImageError),
}

impl EditorError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EditorError::InvalidInput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        EditorError::ResourceUnavailable(msg.into())
    }

    /// Short label used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            EditorError::InvalidInput(_) => "invalid-input",
            EditorError::NotFound => "not-found",
            EditorError::ResourceUnavailable(_) => "resource-unavailable",
            EditorError::ConcurrencyViolation { .. } => "busy",
            EditorError::NoImageLoaded => "no-image",
            EditorError::Io(_) => "io",
            EditorError::Image(_) => "image",
        }
    }
}
