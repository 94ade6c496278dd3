//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration sources could not be read or merged.
    #[display("failed to load configuration")]
    Load,
    /// The configuration file extension is not one figment can parse here.
    #[display("unsupported configuration file: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A value was read successfully but makes no sense.
    #[display("invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Configuration is either valid or it isn't; fix it and try again.
        false
    }
}
