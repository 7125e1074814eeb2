//! Hand-assembled archives, for cases the writer refuses to produce.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use pak_format::{Checksum, Sha1Checksum};

pub struct RawEntry {
    pub path: Vec<u8>,
    /// Relative to the start of the payload region.
    pub offset: u64,
    pub compressed: u64,
    pub uncompressed: u64,
    pub method: u32,
    pub digest: [u8; 20],
    pub flags: u8,
}

/// A stored entry whose digest matches `data`.
pub fn stored(path: &str, offset: u64, data: &[u8]) -> RawEntry {
    RawEntry {
        path: path.as_bytes().to_vec(),
        offset,
        compressed: data.len() as u64,
        uncompressed: data.len() as u64,
        method: 0,
        digest: Sha1Checksum.digest(data).0,
        flags: 0,
    }
}

pub struct RawArchive {
    pub header: bool,
    pub version: u32,
    pub payload: Vec<u8>,
    pub entries: Vec<RawEntry>,
    pub hash_index: bool,
}

impl RawArchive {
    pub fn new(payload: &[u8], entries: Vec<RawEntry>) -> RawArchive {
        RawArchive {
            header: true,
            version: 15,
            payload: payload.to_vec(),
            entries,
            hash_index: true,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let hashed = self.version >= 8;
        let base = if self.header { 8 } else { 0 };

        let mut out = vec![];
        if self.header {
            out.extend_from_slice(b"PAK\0");
            out.write_u32::<LittleEndian>(self.version).unwrap();
        }
        out.extend_from_slice(&self.payload);

        let mut index = vec![];
        index
            .write_u32::<LittleEndian>(self.entries.len() as u32)
            .unwrap();
        for e in &self.entries {
            index.write_u32::<LittleEndian>(e.path.len() as u32).unwrap();
            index.extend_from_slice(&e.path);
            index.write_u64::<LittleEndian>(base + e.offset).unwrap();
            index.write_u64::<LittleEndian>(e.compressed).unwrap();
            index.write_u64::<LittleEndian>(e.uncompressed).unwrap();
            index.write_u32::<LittleEndian>(e.method).unwrap();
            if hashed {
                index.extend_from_slice(&e.digest);
                index.write_u8(e.flags).unwrap();
            }
        }

        let index_offset = out.len() as u64;
        out.extend_from_slice(&index);
        out.write_u64::<LittleEndian>(index_offset).unwrap();
        out.write_u64::<LittleEndian>(index.len() as u64).unwrap();
        if hashed {
            if self.hash_index {
                out.extend_from_slice(&Sha1Checksum.digest(&index).0);
            } else {
                out.extend_from_slice(&[0u8; 20]);
            }
        }
        out.write_u32::<LittleEndian>(self.version).unwrap();
        out.extend_from_slice(b"PAK\0");
        out
    }
}

/// Write `bytes` to `name` inside `dir`, returning the path.
pub fn write_archive(dir: &std::path::Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Number of entries beneath `dir`, recursively.
pub fn count_files(dir: &std::path::Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            if e.file_type().unwrap().is_dir() {
                1 + count_files(&e.path())
            } else {
                1
            }
        })
        .sum()
}
