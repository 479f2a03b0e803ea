//! Error types for the hosts crate.

use std::path::PathBuf;

use thiserror::Error;

/// Host directory error type.
#[derive(Debug, Error)]
pub enum HostsError {
    /// The configuration file exists but could not be read.
    #[error("failed to read ssh config {}: {source}", .path.display())]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A forward directive could not be interpreted.
    #[error("invalid {directive} directive: {value:?}")]
    InvalidForward {
        /// The directive keyword as written.
        directive: String,
        /// The raw directive value.
        value: String,
    },

    /// A host alias was requested that the directory does not contain.
    #[error("unknown host: {0}")]
    UnknownHost(String),
}

/// Result type alias for host directory operations.
pub type Result<T> = std::result::Result<T, HostsError>;
