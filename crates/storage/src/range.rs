//! Scan ranges: contiguous byte extents of one stored file.

use std::path::{Path, PathBuf};
use tuplescan_compress::Codec;

/// A contiguous byte extent of one stored file, assigned to a scanner for
/// one pass.
///
/// Offsets are in the file's on-disk (possibly compressed) byte space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Path of the file, relative to the byte source root.
    pub path: PathBuf,
    /// First byte of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub len: u64,
    /// Total length of the file the range belongs to.
    pub file_len: u64,
    /// Codec the file is stored with, detected from its extension.
    pub codec: Codec,
}

impl ScanRange {
    /// A range over `[offset, offset + len)` of a file of `file_len` bytes.
    pub fn new(path: impl Into<PathBuf>, offset: u64, len: u64, file_len: u64) -> Self {
        let path = path.into();
        let codec = Codec::from_path(&path);
        Self { path, offset, len, file_len, codec }
    }

    /// A single range covering an entire file.
    pub fn whole_file(path: impl Into<PathBuf>, file_len: u64) -> Self {
        Self::new(path, 0, file_len, file_len)
    }

    /// Override the codec detected from the file extension.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.len)
    }

    /// Whether the range starts at the beginning of its file.
    pub fn is_file_start(&self) -> bool {
        self.offset == 0
    }

    /// Whether the range reaches the end of its file.
    pub fn is_file_end(&self) -> bool {
        self.end() >= self.file_len
    }

    /// Whether the range belongs to the same file as `other`.
    pub fn same_file(&self, other: &ScanRange) -> bool {
        self.path == other.path
    }

    /// Cut a file into ranges of roughly `target_len` bytes each.
    ///
    /// Files whose codec cannot be entered mid-stream always come back as a
    /// single range, as does an empty file. A `target_len` of zero is
    /// treated as "don't split".
    ///
    /// # Examples
    ///
    /// ```
    /// use tuplescan_storage::ScanRange;
    ///
    /// let ranges = ScanRange::split("part-0000.txt", 10, 4);
    /// let extents: Vec<_> = ranges.iter().map(|r| (r.offset, r.len)).collect();
    /// assert_eq!(extents, [(0, 4), (4, 4), (8, 2)]);
    ///
    /// assert_eq!(ScanRange::split("part-0000.txt.gz", 10, 4).len(), 1);
    /// ```
    pub fn split(path: impl AsRef<Path>, file_len: u64, target_len: u64) -> Vec<ScanRange> {
        let path = path.as_ref();
        let codec = Codec::from_path(path);
        if !codec.is_splittable() || target_len == 0 || file_len <= target_len {
            return vec![Self::whole_file(path, file_len)];
        }
        let mut ranges = Vec::with_capacity(file_len.div_ceil(target_len) as usize);
        let mut offset = 0;
        while offset < file_len {
            let len = target_len.min(file_len - offset);
            ranges.push(Self::new(path, offset, len, file_len));
            offset += len;
        }
        ranges
    }
}
