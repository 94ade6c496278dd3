use crate::Codec;
use crate::error::{Error, ErrorKind};
use std::{path::Path, str::FromStr};

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
#[cfg(feature = "xz")]
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
#[cfg(feature = "zstd")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// Compression method 8 (deflate) with a 32KiB window, the only zlib
/// header anyone writes in practice.
const ZLIB_CMF: u8 = 0x78;

impl FromStr for Codec {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Codec::None),
            #[cfg(feature = "brotli")]
            "br" | "brotli" => Ok(Codec::Brotli),
            #[cfg(not(feature = "brotli"))]
            "br" | "brotli" => exn::bail!(ErrorKind::DisabledCodec(s.to_string())),
            "bz2" | "bzip2" => Ok(Codec::Bzip2),
            "deflate" | "zlib" => Ok(Codec::Deflate),
            "gz" | "gzip" => Ok(Codec::Gzip),
            #[cfg(feature = "xz")]
            "xz" | "lzma" => Ok(Codec::Xz),
            #[cfg(not(feature = "xz"))]
            "xz" | "lzma" => exn::bail!(ErrorKind::DisabledCodec(s.to_string())),
            #[cfg(feature = "zstd")]
            "zst" | "zstd" => Ok(Codec::Zstd),
            #[cfg(not(feature = "zstd"))]
            "zst" | "zstd" => exn::bail!(ErrorKind::DisabledCodec(s.to_string())),
            _ => exn::bail!(ErrorKind::UnsupportedCodec(s.to_string())),
        }
    }
}

impl Codec {
    /// Detect the codec from a file extension. Unknown extensions are
    /// treated as uncompressed.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| match ext.to_lowercase().as_str() {
                #[cfg(feature = "brotli")]
                "br" => Codec::Brotli,
                "bz2" => Codec::Bzip2,
                "deflate" => Codec::Deflate,
                "gz" => Codec::Gzip,
                #[cfg(feature = "xz")]
                "xz" => Codec::Xz,
                #[cfg(feature = "zstd")]
                "zst" => Codec::Zstd,
                _ => Codec::None,
            })
            .unwrap_or(Codec::None)
    }

    /// Detect the codec from the first bytes of a file.
    ///
    /// Returns [`Codec::None`] if nothing matches or the input is too short.
    /// Brotli has no magic bytes and is never detected this way.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Codec::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Codec::Gzip;
        }
        #[cfg(feature = "xz")]
        if bytes.starts_with(&XZ_MAGIC) {
            return Codec::Xz;
        }
        #[cfg(feature = "zstd")]
        if bytes.starts_with(&ZSTD_MAGIC) {
            return Codec::Zstd;
        }
        if let [cmf, flg, ..] = bytes
            && *cmf == ZLIB_CMF
            && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0
        {
            return Codec::Deflate;
        }
        Codec::None
    }
}
