//! Logical paths as stored in the index.
//!
//! A logical path is relative, `/`-separated and may never name anything
//! outside the directory it is extracted into.

use std::fmt;
use std::path::{Path, PathBuf};

/// The separator used in stored paths, regardless of platform.
pub const PATH_PAK_SEP: &str = "/";

/// Longest path the index may carry, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntoPakPathError {
    EmptyPath,
    TooLong(usize),
    /// An empty or `.` component, or a trailing separator.
    NonCanonical,
    /// A `..` component, an absolute or drive-prefixed path, a backslash or a NUL.
    Traversal,
}

impl std::error::Error for IntoPakPathError {}

impl fmt::Display for IntoPakPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntoPakPathError::EmptyPath => f.write_str("no path provided"),
            IntoPakPathError::TooLong(len) => {
                write!(f, "path is {} bytes, limit is {}", len, MAX_PATH_LEN)
            }
            IntoPakPathError::NonCanonical => f.write_str("non-canonical path"),
            IntoPakPathError::Traversal => f.write_str("path escapes its root"),
        }
    }
}

/// True if `path` could name something outside the extraction root.
pub fn contains_traversal(path: &str) -> bool {
    if path.contains('\0') || path.contains('\\') {
        return true;
    }

    if path.starts_with('/') {
        return true;
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }

    path.split(PATH_PAK_SEP).any(|c| c == "..")
}

#[derive(Debug, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PakPath(String);

impl PakPath {
    pub fn new<S: AsRef<str>>(path: S) -> std::result::Result<PakPath, IntoPakPathError> {
        let path = path.as_ref();

        if path.is_empty() {
            return Err(IntoPakPathError::EmptyPath);
        }

        if path.len() > MAX_PATH_LEN {
            return Err(IntoPakPathError::TooLong(path.len()));
        }

        if contains_traversal(path) {
            tracing::warn!(target: "security", path, "rejected traversing path");
            return Err(IntoPakPathError::Traversal);
        }

        if path.split(PATH_PAK_SEP).any(|c| c.is_empty() || c == ".") {
            return Err(IntoPakPathError::NonCanonical);
        }

        Ok(PakPath(path.to_string()))
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn iter(&self) -> std::str::Split<'_, &str> {
        self.0.split(PATH_PAK_SEP)
    }

    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once(PATH_PAK_SEP).map(|(parent, _)| parent)
    }

    pub fn filename(&self) -> &str {
        match self.0.rsplit_once(PATH_PAK_SEP) {
            Some((_, name)) => name,
            None => &self.0,
        }
    }

    pub fn depth(&self) -> usize {
        self.0.matches(PATH_PAK_SEP).count()
    }

    /// Component-wise prefix test: `a/bc` starts with `a` but not with `a/b`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Where this path lands beneath `root` on the local filesystem.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for component in self.iter() {
            out.push(component);
        }
        out
    }
}

impl fmt::Display for PakPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PakPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
