//! Decompression codecs for compressed scan inputs.
//!
//! Text files are frequently stored compressed. This crate wraps the codec
//! libraries behind a single [`Codec`] enum, providing:
//!
//! - **Detection** from file extensions ([`Codec::from_path`]) or magic bytes
//!   ([`Codec::from_magic_bytes`])
//! - **Whole-buffer** decompression ([`Codec::decompress`]), which is how a
//!   scanner consumes a compressed file: none of these formats can be entered
//!   at an arbitrary byte offset, so a compressed file is always read as one
//!   scan range ([`Codec::is_splittable`])
//! - **Streaming** decoders ([`Codec::decoder`]) and encoders
//!   ([`Codec::encoder`]), the latter mostly useful for producing test inputs
//!
//! Bzip2, Deflate (zlib) and Gzip are always available. Brotli, XZ and Zstd
//! are behind feature flags.

mod codec;
mod detect;
pub mod error;

/// A supported compression codec.
///
/// Variants gated behind feature flags (`brotli`, `xz`, `zstd`) are only
/// available when the corresponding feature is enabled. Defaults to
/// [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Uncompressed
    #[default]
    None,
    /// Brotli (.br)
    #[cfg(feature = "brotli")]
    Brotli,
    /// Bzip2 (.bz2)
    Bzip2,
    /// Zlib-wrapped deflate, as written by Hadoop's `DefaultCodec` (.deflate)
    Deflate,
    /// Gzip (.gz)
    Gzip,
    /// XZ/LZMA (.xz)
    #[cfg(feature = "xz")]
    Xz,
    /// Zstd (.zst)
    #[cfg(feature = "zstd")]
    Zstd,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Codec {
    /// Returns the file extension (including the leading dot) for this codec.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::None => "",
            #[cfg(feature = "brotli")]
            Codec::Brotli => ".br",
            Codec::Bzip2 => ".bz2",
            Codec::Deflate => ".deflate",
            Codec::Gzip => ".gz",
            #[cfg(feature = "xz")]
            Codec::Xz => ".xz",
            #[cfg(feature = "zstd")]
            Codec::Zstd => ".zst",
        }
    }

    /// Short name, as accepted by [`FromStr`](std::str::FromStr).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::None => "none",
            #[cfg(feature = "brotli")]
            Codec::Brotli => "brotli",
            Codec::Bzip2 => "bzip2",
            Codec::Deflate => "deflate",
            Codec::Gzip => "gzip",
            #[cfg(feature = "xz")]
            Codec::Xz => "xz",
            #[cfg(feature = "zstd")]
            Codec::Zstd => "zstd",
        }
    }

    /// Whether a file in this codec may be cut into several scan ranges.
    ///
    /// Only uncompressed data can be entered mid-file. Block-based codecs
    /// like bzip2 technically could be, but nothing here indexes their blocks.
    #[must_use]
    pub fn is_splittable(&self) -> bool {
        matches!(self, Codec::None)
    }
}
