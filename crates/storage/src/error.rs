//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;
use tuplescan_compress::Codec;
use tuplescan_compress::error::{Error as CodecError, ErrorKind as CodecErrorKind};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for byte source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid components or escapes the source root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A read or seek was attempted before [`open`](crate::ByteSource::open)
    #[display("byte source is not open")]
    NotOpen,
    /// Seek target lies beyond the end of the file
    #[display("cannot seek to offset {offset} in {}", path.display())]
    SeekOutOfRange {
        /// File being positioned.
        path: PathBuf,
        /// Requested offset.
        offset: u64,
    },
    /// A compressed file was asked to start anywhere but its first byte
    #[display("{_0} data cannot be entered mid-stream")]
    Unsplittable(#[error(not(source))] Codec),
    /// Decompression failed
    #[display("codec error: {_0}")]
    Codec(CodecErrorKind),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Convert a codec error into a storage error, keeping the codec crate's
    /// `Exn` frame as a child in the new error tree.
    #[track_caller]
    pub fn codec(err: CodecError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Codec(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_keep_their_kind() {
        let err = "snappy".parse::<Codec>().unwrap_err();
        let err = ErrorKind::codec(err);
        assert!(matches!(&*err, ErrorKind::Codec(CodecErrorKind::UnsupportedCodec(name)) if name == "snappy"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_errors_are_retryable() {
        let kind = ErrorKind::from(IoError::other("disk went away"));
        assert!(kind.is_retryable());
        assert!(!ErrorKind::NotOpen.is_retryable());
    }
}
