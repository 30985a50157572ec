//! Write-path error types.

use fastfile_io::IoError;

/// Errors from the write path.
///
/// Nothing here is retried internally. Partial progress is preserved where
/// possible: an aborted flush leaves already-written pages on the device and
/// the rest cached, so a caller may simply flush again.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// Error from the raw device layer.
    #[error(transparent)]
    Io(#[from] IoError),

    /// The handle was already closed.
    #[error("file handle is closed")]
    Closed,

    /// The open-time options are unusable.
    #[error("invalid options: {reason}")]
    InvalidOptions { reason: &'static str },
}
