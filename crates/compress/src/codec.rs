//! Encoding and decoding.

use crate::Codec;
use crate::error::{ErrorKind, Result};
#[cfg(feature = "brotli")]
use brotli::{CompressorWriter as BrotliEncoder, Decompressor as BrotliDecoder};
use bzip2::{Compression as BzLevel, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{
    Compression as FlateLevel,
    read::{GzDecoder, ZlibDecoder},
    write::{GzEncoder, ZlibEncoder},
};
use std::io::{Read, Write};
use tracing::instrument;
#[cfg(feature = "xz")]
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Encoders only exist to produce inputs, so favour speed over ratio.
const BZIP2_LEVEL: BzLevel = BzLevel::fast();
const FLATE_LEVEL: FlateLevel = FlateLevel::fast();
#[cfg(feature = "xz")]
const XZ_LEVEL: u32 = 1;
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 1;
#[cfg(feature = "brotli")]
const BROTLI_LEVEL: u32 = 1;
#[cfg(feature = "brotli")]
const BROTLI_BUFFER_SIZE: usize = 4096;
#[cfg(feature = "brotli")]
const BROTLI_LG_WINDOW_SIZE: u32 = 22;

impl Codec {
    /// Wrap a reader with the matching decoder.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use tuplescan_compress::Codec;
    ///
    /// let compressed = Codec::Gzip.compress(b"1,a\n2,b\n").unwrap();
    /// let mut decoder = Codec::Gzip.decoder(Cursor::new(compressed)).unwrap();
    /// let mut text = Vec::new();
    /// decoder.read_to_end(&mut text).unwrap();
    /// assert_eq!(text, b"1,a\n2,b\n");
    /// ```
    pub fn decoder<'a, R: Read + Send + 'a>(&self, reader: R) -> Result<Box<dyn Read + Send + 'a>> {
        Ok(match self {
            Codec::None => Box::new(reader),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Box::new(BrotliDecoder::new(reader, BROTLI_BUFFER_SIZE)),
            Codec::Bzip2 => Box::new(BzDecoder::new(reader)),
            Codec::Deflate => Box::new(ZlibDecoder::new(reader)),
            Codec::Gzip => Box::new(GzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Codec::Xz => Box::new(XzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Codec::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
        })
    }

    /// Wrap a writer with the matching encoder. Dropping the returned writer
    /// finishes the stream.
    pub fn encoder<'a, W: Write + 'a>(&self, writer: W) -> Result<Box<dyn Write + 'a>> {
        Ok(match self {
            Codec::None => Box::new(writer),
            #[cfg(feature = "brotli")]
            Codec::Brotli => {
                Box::new(BrotliEncoder::new(writer, BROTLI_BUFFER_SIZE, BROTLI_LEVEL, BROTLI_LG_WINDOW_SIZE))
            },
            Codec::Bzip2 => Box::new(BzEncoder::new(writer, BZIP2_LEVEL)),
            Codec::Deflate => Box::new(ZlibEncoder::new(writer, FLATE_LEVEL)),
            Codec::Gzip => Box::new(GzEncoder::new(writer, FLATE_LEVEL)),
            #[cfg(feature = "xz")]
            Codec::Xz => Box::new(XzEncoder::new(writer, XZ_LEVEL)),
            #[cfg(feature = "zstd")]
            Codec::Zstd => Box::new(ZstdEncoder::new(writer, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?.auto_finish()),
        })
    }

    /// Decompress a complete file held in memory.
    #[instrument(skip(input), fields(codec = %self, input_size = input.len(), output_size))]
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        if matches!(self, Codec::None) {
            output.extend_from_slice(input);
        } else {
            self.decoder(input)?.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
        }
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }

    /// Compress a byte slice in memory.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        {
            let mut encoder = self.encoder(&mut output)?;
            encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
            encoder.flush().or_raise(|| ErrorKind::Io)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::Codec;
    use crate::error::ErrorKind;
    use rstest::rstest;

    const ROWS: &[u8] = b"1,alice,2024-01-01\n2,bob,2024-01-02\n3,carol,2024-01-03\n";

    #[rstest]
    #[case(Codec::None)]
    #[case(Codec::Bzip2)]
    #[case(Codec::Deflate)]
    #[case(Codec::Gzip)]
    #[cfg_attr(feature = "brotli", case(Codec::Brotli))]
    #[cfg_attr(feature = "xz", case(Codec::Xz))]
    #[cfg_attr(feature = "zstd", case(Codec::Zstd))]
    fn test_compressed_file_decodes(#[case] codec: Codec) {
        let compressed = codec.compress(ROWS).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), ROWS);
    }

    #[rstest]
    #[case(Codec::Bzip2)]
    #[case(Codec::Deflate)]
    #[case(Codec::Gzip)]
    #[cfg_attr(feature = "xz", case(Codec::Xz))]
    #[cfg_attr(feature = "zstd", case(Codec::Zstd))]
    fn test_plain_text_is_invalid(#[case] codec: Codec) {
        let err = codec.decompress(ROWS).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData);
    }

    #[rstest]
    #[case(Codec::Bzip2)]
    #[case(Codec::Deflate)]
    #[case(Codec::Gzip)]
    fn test_detected_from_own_output(#[case] codec: Codec) {
        let compressed = codec.compress(ROWS).unwrap();
        assert_eq!(Codec::from_magic_bytes(&compressed), codec);
    }
}
