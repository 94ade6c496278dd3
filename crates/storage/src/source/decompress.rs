//! Transparent decompression over another byte source.

use crate::ByteSource;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;
use tuplescan_compress::Codec;
use tuplescan_compress::error::ErrorKind as CodecErrorKind;

/// Longest magic number [`Codec::from_magic_bytes`] looks at.
const MAGIC_LEN: usize = 6;

enum Mode {
    Closed,
    Passthrough,
    Decoded { path: PathBuf, reader: Box<dyn Read + Send>, position: u64 },
}

/// Wraps a byte source and decodes compressed files as they are read.
///
/// The codec is taken from the file extension, falling back to sniffing the
/// first bytes of the file. Uncompressed files are passed straight through
/// (and stay seekable). Compressed files are decoded incrementally, pulling
/// compressed bytes from the wrapped source only as decoded bytes are asked
/// for, and offsets refer to the decoded bytes. Since compressed data cannot
/// be entered mid-stream, seeking a decoded file anywhere but offset zero is
/// [`Unsplittable`](ErrorKind::Unsplittable). Seeking back to zero restarts
/// decoding.
pub struct DecompressingByteSource<S> {
    name: String,
    inner: Arc<Mutex<S>>,
    codec: Option<Codec>,
    detected: Codec,
    mode: Mode,
}

impl<S: ByteSource + 'static> DecompressingByteSource<S> {
    pub fn new(inner: S) -> Self {
        let name = inner.name().to_string();
        Self { name, inner: Arc::new(Mutex::new(inner)), codec: None, detected: Codec::None, mode: Mode::Closed }
    }

    /// Always use `codec` instead of detecting one per file.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Codec of the currently open file.
    pub fn codec(&self) -> Codec {
        self.detected
    }

    fn inner(&self) -> MutexGuard<'_, S> {
        lock(&self.inner)
    }

    fn detect(&self, path: &Path) -> Result<Codec> {
        if let Some(codec) = self.codec {
            return Ok(codec);
        }
        let by_extension = Codec::from_path(path);
        if by_extension != Codec::None {
            return Ok(by_extension);
        }
        let mut inner = self.inner();
        let mut head = [0; MAGIC_LEN];
        let n = inner.read_full(&mut head)?;
        inner.seek(0)?;
        Ok(Codec::from_magic_bytes(&head[..n]))
    }

    /// Start decoding the open file from its first byte.
    #[instrument(skip(self), fields(source = %self.name))]
    fn start_decoding(&mut self, path: &Path, codec: Codec) -> Result<()> {
        let reader = codec.decoder(SourceReader(Arc::clone(&self.inner))).map_err(ErrorKind::codec)?;
        tracing::trace!(path = %path.display(), "decoding");
        self.mode = Mode::Decoded { path: path.to_path_buf(), reader, position: 0 };
        Ok(())
    }
}

impl<S: ByteSource + 'static> ByteSource for DecompressingByteSource<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        self.close();
        self.inner().open(path)?;
        let codec = self.detect(path)?;
        self.detected = codec;
        if codec == Codec::None {
            self.mode = Mode::Passthrough;
            return Ok(());
        }
        self.start_decoding(path, codec)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        let restart = match &self.mode {
            Mode::Closed => exn::bail!(ErrorKind::NotOpen),
            Mode::Passthrough => return self.inner().seek(offset),
            Mode::Decoded { position: 0, .. } if offset == 0 => return Ok(()),
            Mode::Decoded { path, .. } if offset == 0 => path.clone(),
            Mode::Decoded { .. } => exn::bail!(ErrorKind::Unsplittable(self.detected)),
        };
        self.inner().seek(0)?;
        self.start_decoding(&restart, self.detected)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.mode {
            Mode::Closed => exn::bail!(ErrorKind::NotOpen),
            Mode::Passthrough => lock(&self.inner).read(buf),
            Mode::Decoded { reader, position, .. } => {
                let n = match reader.read(buf) {
                    Ok(n) => n,
                    Err(err) if is_corrupt(&err) => {
                        return Err(err).or_raise(|| ErrorKind::Codec(CodecErrorKind::InvalidData));
                    },
                    Err(err) => exn::bail!(ErrorKind::Io(err)),
                };
                *position += n as u64;
                Ok(n)
            },
        }
    }

    fn position(&self) -> u64 {
        match &self.mode {
            Mode::Closed => 0,
            Mode::Passthrough => self.inner().position(),
            Mode::Decoded { position, .. } => *position,
        }
    }

    fn close(&mut self) {
        if let Mode::Decoded { path, position, .. } = &self.mode {
            tracing::trace!(path = %path.display(), decoded = position, "releasing decoded file");
        }
        self.mode = Mode::Closed;
        self.detected = Codec::None;
        self.inner().close();
    }
}

fn lock<S>(inner: &Mutex<S>) -> MutexGuard<'_, S> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decoders report malformed input as invalid data or input, or as a stream
/// that ends early.
fn is_corrupt(err: &IoError) -> bool {
    matches!(err.kind(), IoErrorKind::InvalidData | IoErrorKind::InvalidInput | IoErrorKind::UnexpectedEof)
}

/// Feeds a decoder from the wrapped source.
struct SourceReader<S>(Arc<Mutex<S>>);

impl<S: ByteSource> Read for SourceReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        lock(&self.0).read(buf).map_err(|err| IoError::other(err.to_string()))
    }
}
