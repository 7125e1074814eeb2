use std::path::Path;

use pak_format::{FileSource, PakReader};

use crate::error::{Error, Result};

pub fn open_archive(path: &Path) -> Result<PakReader<FileSource>> {
    PakReader::open_file(path).map_err(|source| Error::OpenArchive {
        path: path.to_path_buf(),
        source,
    })
}

pub fn format_size(bytes: u64) -> String {
    use humansize::{format_size, BINARY};
    format_size(bytes, BINARY)
}

/// Space saved by compression, as a percentage.
pub fn ratio(compressed: u64, uncompressed: u64) -> f64 {
    if uncompressed == 0 {
        0.0
    } else {
        100.0 - (compressed as f64 / uncompressed as f64 * 100.0)
    }
}
