//! Row Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use crate::SlotType;
use derive_more::{Display, Error};

/// A row/tuple error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for row operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// All of these indicate a programming error in the caller (a slot id or
/// value that doesn't fit the descriptor it is used with), never bad data.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("no slot {_0} in tuple descriptor")]
    UnknownSlot(#[error(not(source))] usize),
    #[display("column {_0} is mapped to more than one slot")]
    DuplicateColumn(#[error(not(source))] usize),
    #[display("slot {slot} holds {expected} values, not {actual}")]
    TypeMismatch { slot: usize, expected: SlotType, actual: SlotType },
    #[display("slot {_0} is not a partition key")]
    NotPartitionKey(#[error(not(source))] usize),
    #[display("template tuple was built for a different tuple descriptor")]
    TemplateMismatch,
    #[display("tuple buffer is full")]
    BufferFull,
    #[display("row batch is full")]
    BatchFull,
    #[display("tuple index {index} is outside a row of width {width}")]
    TupleIndex { index: usize, width: usize },
    #[display("string of {_0} bytes is too long for a slot")]
    StringTooLong(#[error(not(source))] usize),
    #[display("invalid timestamp: {_0}")]
    InvalidTimestamp(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
