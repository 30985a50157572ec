//! I/O error types.

use std::path::PathBuf;

/// Errors from the raw device layer.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Neither the direct-mode nor the buffered open succeeded.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying OS I/O error from a positioned read or write.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A positioned write transferred fewer bytes than requested.
    ///
    /// Short writes are fatal for the caller's operation; nothing in this
    /// layer retries them.
    #[error("short write at offset {offset}: wrote {actual} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// Releasing the descriptor failed.
    #[error("failed to close file: {source}")]
    Close {
        #[source]
        source: std::io::Error,
    },
}
