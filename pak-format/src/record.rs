use std::ops::Range;

use crate::checksum::PakDigest;
use crate::compression::Compression;
use crate::path::PakPath;

/// Entry flag: the stored payload is encrypted.
pub const ENTRY_FLAG_ENCRYPTED: u8 = 0x01;
pub(crate) const ENTRY_FLAGS_KNOWN: u8 = ENTRY_FLAG_ENCRYPTED;

/// One file stored in the archive, as decoded from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Logical path, unique within the archive.
    pub path: PakPath,

    /// Absolute position of the stored payload.
    pub data_offset: u64,

    /// The exact length of the payload as stored.
    pub compressed_size: u64,

    /// Length of the payload after decompression.
    pub uncompressed_size: u64,

    pub compression: Compression,

    /// SHA-1 of the uncompressed payload, if recorded.
    pub digest: Option<PakDigest>,

    pub encrypted: bool,

    /// Position in the index.
    pub(crate) index: usize,
}

impl EntryRecord {
    #[inline(always)]
    pub fn path(&self) -> &PakPath {
        &self.path
    }

    #[inline(always)]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The byte range the payload occupies. Only valid for records that came
    /// out of the index parser, which guarantees the end does not overflow.
    #[inline(always)]
    pub fn data_range(&self) -> Range<u64> {
        self.data_offset..self.data_offset + self.compressed_size
    }

    pub fn flags(&self) -> u8 {
        if self.encrypted {
            ENTRY_FLAG_ENCRYPTED
        } else {
            0
        }
    }
}
