//! Scanner Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Storage and tuple errors are kept as children of the
//! scanner error that wraps them.
//!
//! Per-field parse errors are not errors in this sense: they are counted and
//! logged through [`RuntimeState`](crate::RuntimeState) and the scan goes on.
//! The one exception is [`ParseAborted`](ErrorKind::ParseAborted), raised
//! only when `abort_on_error` is configured.

use crate::Lifecycle;
use derive_more::{Display, Error};
use tuplescan_row::SlotType;

/// A scanner error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No scanner exists for the named file format.
    #[display("unknown file format: {_0}")]
    UnknownFormat(#[error(not(source))] String),
    /// One-time setup could not complete; the scanner instance is unusable.
    #[display("scanner initialization failed")]
    Initialization,
    /// The format has no conversion for a slot type.
    #[display("slot {slot} has type {ty}, which {format} files cannot hold")]
    UnsupportedType { slot: usize, ty: SlotType, format: &'static str },
    /// An operation was called in a state that doesn't allow it.
    #[display("cannot {operation} a scanner that is {state}")]
    Lifecycle { operation: &'static str, state: Lifecycle },
    /// The template tuple was built for another tuple layout.
    #[display("template tuple does not match the scan node's tuple descriptor")]
    TemplateMismatch,
    /// The byte source failed; the current range is abandoned.
    #[display("failed to read scan range")]
    Io,
    /// Tuple storage rejected a write. Indicates a bug, not bad data.
    #[display("failed to write tuple")]
    Tuple,
    /// A field failed to parse and the scan is configured to stop on the
    /// first such error. Tuples written before it have been published.
    #[display("scan aborted: {_0}")]
    ParseAborted(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
