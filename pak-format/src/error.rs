use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::checksum::PakDigest;
use crate::compression::CodecError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while opening, indexing or extracting an archive.
///
/// Errors are cheap to clone so a reader that failed to load can hand the
/// original failure back on every later call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Not a PAK archive (expected magic {expected:02x?}, found {found:02x?} at offset {offset:#x}). Archive: '{archive}'")]
    InvalidFormat {
        archive: String,
        offset: u64,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("Header version {header} does not match footer version {footer}. Archive: '{archive}'")]
    VersionMismatch {
        archive: String,
        header: u32,
        footer: u32,
    },

    #[error("Archive is truncated (needed {needed} bytes at offset {offset:#x}, archive is {size} bytes). Archive: '{archive}'")]
    TruncatedArchive {
        archive: String,
        offset: u64,
        needed: u64,
        size: u64,
    },

    #[error("Unsupported archive version {version}. Archive: '{archive}'")]
    UnsupportedVersion { archive: String, version: u32 },

    #[error("Corrupt index at offset {offset:#x}: {reason}. Archive: '{archive}'")]
    CorruptIndex {
        archive: String,
        offset: u64,
        reason: String,
    },

    #[error("Index hash mismatch (expected {expected}, got {actual}). Archive: '{archive}'")]
    IndexHashMismatch {
        archive: String,
        expected: PakDigest,
        actual: PakDigest,
    },

    #[error("Duplicate path '{path}' in index (entries {first} and {second}). Archive: '{archive}'")]
    DuplicatePath {
        archive: String,
        path: String,
        first: usize,
        second: usize,
    },

    #[error("Path escapes the extraction root: '{path}'")]
    PathTraversalRejected { path: String },

    #[error("Path not found in archive. Path: '{path}'")]
    NotFound { path: String },

    #[error("Unsupported compression method {method} for '{path}'")]
    UnsupportedMethod { path: String, method: u32 },

    #[error("Decompressing '{path}' at offset {offset:#x} failed")]
    DecompressionFailed {
        path: String,
        offset: u64,
        #[source]
        source: CodecError,
    },

    #[error("'{path}' is encrypted and no decryptor is configured")]
    EncryptedEntry { path: String },

    #[error("Decrypting '{path}' at offset {offset:#x} failed")]
    DecryptionFailed {
        path: String,
        offset: u64,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Integrity check failed for '{path}' (expected {expected}, got {actual})")]
    IntegrityMismatch {
        path: String,
        expected: PakDigest,
        actual: PakDigest,
    },

    #[error("Destination already exists. Path: '{}'", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Reader is not ready for this operation (state: {state})")]
    NotReady { state: ReaderState },

    #[error("Archive source has been closed")]
    SourceClosed,

    #[error("Extraction was cancelled before '{path}' was started")]
    Cancelled { path: String },

    #[error("I/O failure. Path: '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Flat classification of [`Error`], convenient for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    TruncatedArchive,
    UnsupportedVersion,
    CorruptIndex,
    IndexHashMismatch,
    DuplicatePath,
    PathTraversalRejected,
    NotFound,
    UnsupportedMethod,
    DecompressionFailed,
    EncryptedEntry,
    IntegrityMismatch,
    AlreadyExists,
    NotReady,
    SourceClosed,
    Cancelled,
    IoFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFormat { .. } | Error::VersionMismatch { .. } => ErrorKind::InvalidFormat,
            Error::TruncatedArchive { .. } => ErrorKind::TruncatedArchive,
            Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Error::CorruptIndex { .. } => ErrorKind::CorruptIndex,
            Error::IndexHashMismatch { .. } => ErrorKind::IndexHashMismatch,
            Error::DuplicatePath { .. } => ErrorKind::DuplicatePath,
            Error::PathTraversalRejected { .. } => ErrorKind::PathTraversalRejected,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::UnsupportedMethod { .. } => ErrorKind::UnsupportedMethod,
            Error::DecompressionFailed { .. } => ErrorKind::DecompressionFailed,
            Error::EncryptedEntry { .. } | Error::DecryptionFailed { .. } => {
                ErrorKind::EncryptedEntry
            }
            Error::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotReady { .. } => ErrorKind::NotReady,
            Error::SourceClosed => ErrorKind::SourceClosed,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Io { .. } => ErrorKind::IoFailure,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn corrupt(archive: &str, offset: u64, reason: impl Into<String>) -> Error {
        Error::CorruptIndex {
            archive: archive.to_string(),
            offset,
            reason: reason.into(),
        }
    }
}

/// Lifecycle of a [`PakReader`](crate::PakReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    Opened,
    IndexLoaded,
    Failed,
    Closed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReaderState::Unopened => "unopened",
            ReaderState::Opened => "opened",
            ReaderState::IndexLoaded => "index loaded",
            ReaderState::Failed => "failed",
            ReaderState::Closed => "closed",
        };
        f.write_str(s)
    }
}
