//! Codec Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to initialize an encoder/decoder for the requested codec.
    Encoder,
    /// Compressed data is corrupt or truncated. Don't retry with the same input.
    #[display("invalid or corrupted data")]
    InvalidData,
    /// The requested codec is not known at all.
    #[display("unsupported codec: {_0}")]
    UnsupportedCodec(#[error(not(source))] String),
    /// The requested codec is known but its feature is not enabled.
    #[display("disabled codec: {_0}")]
    DisabledCodec(#[error(not(source))] String),
    /// Writing encoded output failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData.to_string(), "invalid or corrupted data");
        assert_eq!(ErrorKind::UnsupportedCodec("lz4".to_string()).to_string(), "unsupported codec: lz4");
        assert_eq!(ErrorKind::DisabledCodec("zstd".to_string()).to_string(), "disabled codec: zstd");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::InvalidData.is_retryable());
        assert!(!ErrorKind::UnsupportedCodec("snappy".to_string()).is_retryable());
        assert!(ErrorKind::Io.is_retryable());
    }

    #[test]
    fn error_from_io_result() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated"));
        let err = result.or_raise(|| ErrorKind::InvalidData).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }
}
