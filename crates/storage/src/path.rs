//! Path validation for root-relative file paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a root-relative file path and returns it normalized.
///
/// Scan ranges name files relative to a table root; this makes sure such a
/// path can never resolve outside that root. `.` components and repeated
/// separators are dropped, `..` is resolved as long as it stays within the
/// root, null bytes and platform prefixes are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tuplescan_storage::validate_path;
///
/// assert!(validate_path("year=2024/part-0000.txt").is_ok());
/// assert!(validate_path("year=2024/../year=2023/part-0000.txt").is_ok());
/// assert!(validate_path("../secrets").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("./year=2024//part-0000.txt").unwrap(),
///     Path::new("year=2024/part-0000.txt")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) if s.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(s) => components.push(s),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}
