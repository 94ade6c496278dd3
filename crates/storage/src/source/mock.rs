//! In-memory byte source for testing.

use crate::error::{ErrorKind, Result};
use crate::{ByteSource, validate_path};
use std::collections::HashMap;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory byte source for testing.
///
/// Files live behind an [`Arc`], so a configured source can be cloned and
/// handed to several scanners cheaply. Reads can be made to fail once a file
/// has been consumed up to a given offset, which is how tests exercise
/// mid-range I/O failures.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tuplescan_storage::{ByteSource, MockByteSource};
///
/// let mut source = MockByteSource::with_files([("t/part-0000.txt", b"1,a\n2,b\n")]);
/// source.open(Path::new("t/part-0000.txt")).unwrap();
/// let mut buf = [0; 8];
/// assert_eq!(source.read_full(&mut buf).unwrap(), 8);
/// ```
#[derive(Clone)]
pub struct MockByteSource {
    name: String,
    files: Arc<HashMap<PathBuf, Arc<[u8]>>>,
    failures: Arc<HashMap<PathBuf, u64>>,
    current: Option<(PathBuf, Arc<[u8]>)>,
    position: u64,
}

impl MockByteSource {
    /// Create a mock source pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl AsRef<[u8]>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockByteSource::with_files: invalid path {}", path.display());
            };
            map.insert(validated, Arc::from(data.as_ref()));
        }
        Self {
            name: "mock".to_string(),
            files: Arc::new(map),
            failures: Arc::new(HashMap::new()),
            current: None,
            position: 0,
        }
    }

    /// Change the name of the mock source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make reads of `path` fail once they would return bytes at or beyond
    /// `offset`.
    pub fn failing_at(mut self, path: impl Into<PathBuf>, offset: u64) -> Self {
        Arc::make_mut(&mut self.failures).insert(path.into(), offset);
        self
    }
}

impl Default for MockByteSource {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(PathBuf, Vec<u8>)>())
    }
}

impl ByteSource for MockByteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        self.close();
        let validated = validate_path(path)?;
        let Some(data) = self.files.get(&validated) else {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        };
        self.current = Some((validated, Arc::clone(data)));
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        let Some((path, data)) = &self.current else {
            exn::bail!(ErrorKind::NotOpen);
        };
        if offset > data.len() as u64 {
            exn::bail!(ErrorKind::SeekOutOfRange { path: path.clone(), offset });
        }
        self.position = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some((path, data)) = &self.current else {
            exn::bail!(ErrorKind::NotOpen);
        };
        let start = (self.position as usize).min(data.len());
        let mut end = (start + buf.len()).min(data.len());
        if let Some(&fail_at) = self.failures.get(path) {
            let fail_at = fail_at as usize;
            if start >= fail_at && start < end {
                exn::bail!(ErrorKind::Io(IoError::other(format!("injected read failure at offset {start}"))));
            }
            // Hand out everything before the failure point first.
            if end > fail_at && start < fail_at {
                end = fail_at;
            }
        }
        let n = end - start;
        buf[..n].copy_from_slice(&data[start..end]);
        self.position += n as u64;
        Ok(n)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) {
        self.current = None;
        self.position = 0;
    }
}
