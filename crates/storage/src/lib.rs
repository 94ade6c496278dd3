//! Scan ranges and the byte sources scanners read them through.
//!
//! A [`ByteSource`] is a sequential byte supplier bound to one file at a
//! time: a scanner opens it on a [`ScanRange`]'s file, positions it at the
//! range's first byte and reads forward. Implementations:
//!
//! - [`LocalByteSource`] reads files under a root directory,
//! - [`DecompressingByteSource`] transparently decodes compressed files read
//!   through any other source,
//! - `MockByteSource` (feature `mock`) serves in-memory files and can inject
//!   read failures.

pub mod error;
mod path;
mod range;
pub mod source;

pub use crate::path::validate as validate_path;
pub use crate::range::ScanRange;
#[cfg(any(test, feature = "mock"))]
pub use crate::source::MockByteSource;
pub use crate::source::{BoxByteSource, ByteSource, DecompressingByteSource, LocalByteSource};
pub use tuplescan_compress::Codec;
