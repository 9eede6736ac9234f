//! Error types for vecdex
//!
//! Every failure an engine caller can observe is a variant of [`VecdexError`].
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for vecdex operations
pub type VecdexResult<T> = std::result::Result<T, VecdexError>;

/// Error types for the vector index
#[derive(Debug, Error)]
pub enum VecdexError {
    /// Vector length does not match the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Length of the supplied vector
        got: usize,
    },

    /// Caller supplied an unusable argument (k = 0, non-finite component, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// On-disk snapshot failed integrity validation
    #[error("Corrupt snapshot {}: {reason}", path.display())]
    CorruptSnapshot {
        /// Snapshot file that failed validation
        path: PathBuf,
        /// What failed
        reason: String,
    },

    /// Underlying storage read/write failure
    #[error("I/O failure during {context}: {source}")]
    Io {
        /// Operation being performed
        context: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Operation attempted while the engine is not in the `Ready` state
    #[error("Engine not ready (state: {state})")]
    EngineNotReady {
        /// Lifecycle state at the time of the call
        state: String,
    },

    /// A cancellable flush ran past its deadline and was discarded
    #[error("Flush timed out after {timeout:?}; previous snapshot kept")]
    FlushTimedOut {
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VecdexError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        VecdexError::InvalidArgument(message.into())
    }

    /// Create an I/O error with the operation it happened in
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        VecdexError::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a corrupt-snapshot error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VecdexError::CorruptSnapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a caller mistake (never retried)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            VecdexError::DimensionMismatch { .. } | VecdexError::InvalidArgument(_)
        )
    }

    /// Check if retrying the same operation may succeed
    ///
    /// Only storage I/O failures are transient. Corruption, validation and
    /// lifecycle errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VecdexError::Io { .. })
    }
}
