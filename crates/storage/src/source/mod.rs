//! The byte source trait and its implementations.

mod decompress;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::decompress::DecompressingByteSource;
pub use self::local::LocalByteSource;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockByteSource;
use crate::ScanRange;
use crate::error::Result;
use std::path::Path;

/// An owned, type-erased byte source, as handed to a scanner per range.
pub type BoxByteSource = Box<dyn ByteSource>;

/// Sequential byte supplier bound to one file at a time.
///
/// A source is reused across files: [`open`](Self::open) replaces whatever
/// was open before. Reads are blocking; a source is owned and driven by a
/// single scanner, so only `Send` is required.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tuplescan_storage::{ByteSource, ScanRange, error::Result};
///
/// fn first_block(source: &mut dyn ByteSource, range: &ScanRange) -> Result<Vec<u8>> {
///     source.position_at(range)?;
///     let mut block = vec![0; 4096];
///     let n = source.read_full(&mut block)?;
///     block.truncate(n);
///     Ok(block)
/// }
/// ```
pub trait ByteSource: Send {
    /// Name of the source (used for logging only).
    fn name(&self) -> &str;

    /// Open `path` and position at its first byte.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Position the open file at `offset`.
    ///
    /// Seeking to exactly the end of the file is allowed; beyond it is
    /// [`SeekOutOfRange`](crate::error::ErrorKind::SeekOutOfRange).
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes. Returns `0` only at the end of the file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Offset of the next byte [`read`](Self::read) will return.
    fn position(&self) -> u64;

    /// Release the open file, if any.
    fn close(&mut self);

    /// Open the range's file and position at the range's first byte.
    fn position_at(&mut self, range: &ScanRange) -> Result<()> {
        self.open(&range.path)?;
        self.seek(range.offset)
    }

    /// Read until `buf` is full or the file ends, returning bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        (**self).open(path)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
