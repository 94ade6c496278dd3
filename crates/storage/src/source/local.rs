//! Local filesystem byte source.

use crate::error::{ErrorKind, Result};
use crate::{ByteSource, validate_path};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

struct OpenFile {
    path: PathBuf,
    file: File,
    len: u64,
    position: u64,
}

/// Reads files stored under a root directory on the local filesystem.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tuplescan_storage::{ByteSource, LocalByteSource};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut source = LocalByteSource::new("warehouse", "/data/warehouse/events")?;
/// source.open(Path::new("year=2024/part-0000.txt"))?;
/// # Ok(())
/// # }
/// ```
pub struct LocalByteSource {
    name: String,
    root: PathBuf,
    current: Option<OpenFile>,
}

impl LocalByteSource {
    /// Create a source rooted at `root`, which must be an absolute path to
    /// an existing directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root, current: None })
    }

    fn absolute_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn current(&mut self) -> Result<&mut OpenFile> {
        match self.current.as_mut() {
            Some(open) => Ok(open),
            None => exn::bail!(ErrorKind::NotOpen),
        }
    }
}

impl ByteSource for LocalByteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        self.close();
        let absolute = self.absolute_path(path)?;
        let file = File::open(&absolute).map_err(|e| Self::map_io_error(e, path))?;
        let len = file.metadata().map_err(|e| Self::map_io_error(e, path))?.len();
        tracing::trace!(source = %self.name, path = %path.display(), len, "opened file");
        self.current = Some(OpenFile { path: path.to_path_buf(), file, len, position: 0 });
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        let open = self.current()?;
        if offset > open.len {
            exn::bail!(ErrorKind::SeekOutOfRange { path: open.path.clone(), offset });
        }
        open.file.seek(SeekFrom::Start(offset)).map_err(ErrorKind::Io)?;
        open.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let open = self.current()?;
        let n = open.file.read(buf).map_err(ErrorKind::Io)?;
        open.position += n as u64;
        Ok(n)
    }

    fn position(&self) -> u64 {
        self.current.as_ref().map_or(0, |open| open.position)
    }

    fn close(&mut self) {
        self.current = None;
    }
}
