//! Random-access byte sources an archive can be read from.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};

/// Trait for random access reading from an archive.
///
/// Reads take `&self` so that independent entries can be read from several
/// threads at once.
pub trait ByteSource: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`Error::TruncatedArchive`] if the range runs past the end
    /// of the source and with [`Error::SourceClosed`] after [`close`](Self::close).
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Human-readable name used in error messages.
    fn label(&self) -> &str;

    /// Release the underlying handle. Calling this more than once is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

#[inline(always)]
fn check_range(label: &str, offset: u64, len: usize, size: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::TruncatedArchive {
            archive: label.to_string(),
            offset,
            needed: len as u64,
            size,
        }),
    }
}

/// A file on disk, read with positional reads.
#[derive(Debug)]
pub struct FileSource {
    file: Option<File>,
    label: String,
    size: u64,
    #[cfg(not(unix))]
    lock: std::sync::Mutex<()>,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileSource> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let size = file.metadata().map_err(|e| Error::io(path, e))?.len();

        Ok(FileSource {
            file: Some(file),
            label: path.display().to_string(),
            size,
            #[cfg(not(unix))]
            lock: std::sync::Mutex::new(()),
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.file.as_ref().ok_or(Error::SourceClosed)?;
        check_range(&self.label, offset, len, self.size)?;

        let mut buf = vec![0u8; len];

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            file.read_exact_at(&mut buf, offset)
                .map_err(|e| Error::io(&self.label, e))?;
        }

        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            // Seek and read share the file cursor, so serialize them.
            let _guard = self
                .lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut handle = file;
            handle
                .seek(SeekFrom::Start(offset))
                .and_then(|_| handle.read_exact(&mut buf))
                .map_err(|e| Error::io(&self.label, e))?;
        }

        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!(archive = %self.label, "closed file source");
        }
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

/// A memory-mapped file.
#[derive(Debug)]
pub struct MmapSource {
    map: Option<Mmap>,
    label: String,
    size: u64,
}

impl MmapSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MmapSource> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        // Safety: the archive is treated as an immutable snapshot. A concurrent
        // writer truncating the file is outside what this crate can defend against.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
        let size = map.len() as u64;

        Ok(MmapSource {
            map: Some(map),
            label: path.display().to_string(),
            size,
        })
    }
}

impl ByteSource for MmapSource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let map = self.map.as_ref().ok_or(Error::SourceClosed)?;
        check_range(&self.label, offset, len, self.size)?;
        let start = offset as usize;
        Ok(map[start..start + len].to_vec())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn close(&mut self) {
        self.map = None;
    }

    fn is_closed(&self) -> bool {
        self.map.is_none()
    }
}

/// An archive held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Option<Vec<u8>>,
    label: String,
    size: u64,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> MemorySource {
        MemorySource::with_label(data, "<memory>")
    }

    pub fn with_label<S: Into<String>>(data: Vec<u8>, label: S) -> MemorySource {
        let size = data.len() as u64;
        MemorySource {
            data: Some(data),
            label: label.into(),
            size,
        }
    }
}

impl ByteSource for MemorySource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let data = self.data.as_ref().ok_or(Error::SourceClosed)?;
        check_range(&self.label, offset, len, self.size)?;
        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn close(&mut self) {
        self.data = None;
    }

    fn is_closed(&self) -> bool {
        self.data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn memory_reads_and_bounds() {
        let src = MemorySource::new(b"hello world".to_vec());
        assert_eq!(src.size(), 11);
        assert_eq!(src.read_at(6, 5).unwrap(), b"world");
        assert_eq!(src.read_at(11, 0).unwrap(), b"");
        let err = src.read_at(7, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedArchive);
        let err = src.read_at(u64::MAX, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedArchive);
    }

    #[test]
    fn close_is_idempotent() {
        let mut src = MemorySource::new(b"abc".to_vec());
        src.close();
        src.close();
        assert!(src.is_closed());
        assert_eq!(src.read_at(0, 1).unwrap_err().kind(), ErrorKind::SourceClosed);
    }

    #[test]
    fn file_and_mmap_agree() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let file = FileSource::open(tmp.path()).unwrap();
        let mmap = MmapSource::open(tmp.path()).unwrap();
        assert_eq!(file.size(), 10);
        assert_eq!(mmap.size(), 10);
        assert_eq!(file.read_at(3, 4).unwrap(), b"3456");
        assert_eq!(mmap.read_at(3, 4).unwrap(), b"3456");
        assert_eq!(
            file.read_at(8, 4).unwrap_err().kind(),
            ErrorKind::TruncatedArchive
        );
    }

    #[test]
    fn file_close_releases_handle() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();
        let mut file = FileSource::open(tmp.path()).unwrap();
        file.close();
        assert_eq!(file.read_at(0, 1).unwrap_err().kind(), ErrorKind::SourceClosed);
    }

    #[test]
    fn missing_file_is_io_failure() {
        let err = FileSource::open("/definitely/not/here.pak").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
