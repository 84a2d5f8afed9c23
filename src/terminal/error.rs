//! Terminal error types.

use super::SessionId;

/// Errors raised by PTY and session operations.
///
/// Only `SpawnFailed` is returned to callers of the registry; the other
/// variants are logged and absorbed where they occur.
#[derive(thiserror::Error, Debug)]
pub enum TerminalError {
    /// The pseudo-terminal or its child process could not be created.
    #[error("Failed to spawn terminal: {message}")]
    SpawnFailed { message: String },

    /// The session id is unknown or already disposed.
    #[error("Unknown session: {id}")]
    UnknownSession { id: SessionId },

    /// The child process has already exited.
    #[error("Process has exited")]
    ProcessExited,

    /// Killing or unsubscribing failed during disposal.
    #[error("Failed to dispose session {id}: {message}")]
    Disposal { id: SessionId, message: String },

    /// Resizing the PTY failed.
    #[error("Failed to resize terminal: {0}")]
    Resize(String),

    /// I/O error on the PTY.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TerminalError {
    pub(crate) fn spawn(message: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            message: message.to_string(),
        }
    }
}
