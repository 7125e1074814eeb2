//! Decoding the index block into entry records.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Cursor;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::checksum::{Checksum, PakDigest, DIGEST_LEN};
use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::header::PakFooter;
use crate::path::{IntoPakPathError, PakPath, MAX_PATH_LEN};
use crate::record::{EntryRecord, ENTRY_FLAGS_KNOWN, ENTRY_FLAG_ENCRYPTED};
use crate::source::ByteSource;

/// path_len + offset + compressed + uncompressed + method, with an empty path.
const MIN_ENTRY_LEN: u64 = 4 + 8 + 8 + 8 + 4;
/// Extra bytes per entry from the first hashed version on: digest + flags.
const HASHED_ENTRY_EXTRA: u64 = DIGEST_LEN as u64 + 1;

/// Entries whose payload ranges chain together through shared bytes.
///
/// Every member overlaps at least one other member; two members need not
/// overlap each other directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapGroup {
    /// Union of the members' payload ranges.
    pub range: Range<u64>,
    /// Member entry indices, ascending.
    pub entries: Vec<usize>,
}

/// Ordered entries plus a path lookup table.
#[derive(Debug, Clone, Default)]
pub struct PakIndex {
    entries: Vec<EntryRecord>,
    lookup: HashMap<String, usize>,
    overlaps: Vec<OverlapGroup>,
    /// Per entry, the position of its group in `overlaps`.
    overlap_of: Vec<Option<usize>>,
}

impl PakIndex {
    #[inline(always)]
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    #[inline(always)]
    pub fn get(&self, path: &str) -> Option<&EntryRecord> {
        self.lookup.get(path).map(|&i| &self.entries[i])
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntryRecord> {
        self.entries.iter()
    }

    /// Groups of entries sharing payload bytes, ordered by their lowest member.
    pub fn overlaps(&self) -> &[OverlapGroup] {
        &self.overlaps
    }

    /// The overlap group entry `index` belongs to, if any.
    pub fn overlap_group(&self, index: usize) -> Option<&OverlapGroup> {
        self.overlap_of
            .get(index)
            .copied()
            .flatten()
            .map(|group| &self.overlaps[group])
    }

    /// Number of entries that share payload bytes with another entry.
    pub fn overlapping_entries(&self) -> usize {
        self.overlaps.iter().map(|g| g.entries.len()).sum()
    }

    pub fn total_compressed(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_size).sum()
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.entries.iter().map(|e| e.uncompressed_size).sum()
    }
}

impl<'a> IntoIterator for &'a PakIndex {
    type Item = &'a EntryRecord;
    type IntoIter = std::slice::Iter<'a, EntryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

struct IndexCursor<'a> {
    cursor: Cursor<&'a [u8]>,
    archive: &'a str,
    base: u64,
}

impl<'a> IndexCursor<'a> {
    #[inline(always)]
    fn offset(&self) -> u64 {
        self.base + self.cursor.position()
    }

    #[inline(always)]
    fn remaining(&self) -> u64 {
        self.cursor.get_ref().len() as u64 - self.cursor.position()
    }

    fn ended(&self, at: u64, what: &str) -> Error {
        Error::corrupt(self.archive, at, format!("index ended while reading {}", what))
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        let at = self.offset();
        self.cursor.read_u8().map_err(|_| self.ended(at, what))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let at = self.offset();
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.ended(at, what))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let at = self.offset();
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.ended(at, what))
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let at = self.offset();
        if (len as u64) > self.remaining() {
            return Err(self.ended(at, what));
        }
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        self.cursor.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }
}

/// Read and decode the index the footer points at.
///
/// When the footer records an index digest it is checked before a single
/// entry is decoded.
pub fn read_index(
    source: &dyn ByteSource,
    footer: &PakFooter,
    checksum: &dyn Checksum,
) -> Result<PakIndex> {
    let archive = source.label();

    let len = usize::try_from(footer.index_size).map_err(|_| {
        Error::corrupt(
            archive,
            footer.index_offset,
            format!("index of {} bytes cannot be addressed", footer.index_size),
        )
    })?;
    let raw = source.read_at(footer.index_offset, len)?;

    if let Some(expected) = footer.index_digest {
        let actual = checksum.digest(&raw);
        if actual != expected {
            tracing::warn!(archive, %expected, %actual, "index digest mismatch");
            return Err(Error::IndexHashMismatch {
                archive: archive.to_string(),
                expected,
                actual,
            });
        }
    }

    decode_index(archive, &raw, footer)
}

fn decode_index(archive: &str, raw: &[u8], footer: &PakFooter) -> Result<PakIndex> {
    let hashed = footer.entries_hashed();
    let data_end = footer.data_end();
    let mut cur = IndexCursor {
        cursor: Cursor::new(raw),
        archive,
        base: footer.index_offset,
    };

    let count = cur.u32("entry count")?;
    let min_len = MIN_ENTRY_LEN + if hashed { HASHED_ENTRY_EXTRA } else { 0 };
    if (count as u64) * min_len > cur.remaining() {
        return Err(Error::corrupt(
            archive,
            footer.index_offset,
            format!(
                "{} entries cannot fit in {} remaining index bytes",
                count,
                cur.remaining()
            ),
        ));
    }

    let mut entries = Vec::with_capacity(count as usize);
    let mut lookup = HashMap::with_capacity(count as usize);

    for index in 0..count as usize {
        let start = cur.offset();

        let path_len = cur.u32("path length")? as usize;
        if path_len == 0 || path_len > MAX_PATH_LEN {
            return Err(Error::corrupt(
                archive,
                start,
                format!("entry {} has path length {}", index, path_len),
            ));
        }
        let mut path_bytes = cur.bytes(path_len, "path")?;
        if let Some((&0, rest)) = path_bytes.split_last() {
            path_bytes = rest;
        }
        let path = std::str::from_utf8(path_bytes).map_err(|_| {
            Error::corrupt(archive, start, format!("entry {} path is not UTF-8", index))
        })?;
        let path = PakPath::new(path).map_err(|e| match e {
            IntoPakPathError::Traversal => Error::PathTraversalRejected {
                path: path.to_string(),
            },
            e => Error::corrupt(
                archive,
                start,
                format!("entry {} path {:?}: {}", index, path, e),
            ),
        })?;

        let data_offset = cur.u64("data offset")?;
        let compressed_size = cur.u64("compressed size")?;
        let uncompressed_size = cur.u64("uncompressed size")?;
        let compression = Compression::from_id(cur.u32("compression method")?);

        let (digest, encrypted) = if hashed {
            let mut raw_digest = [0u8; DIGEST_LEN];
            raw_digest.copy_from_slice(cur.bytes(DIGEST_LEN, "entry digest")?);
            let flags = cur.u8("entry flags")?;
            if flags & !ENTRY_FLAGS_KNOWN != 0 {
                return Err(Error::corrupt(
                    archive,
                    start,
                    format!("entry {} has unknown flags {:#04x}", index, flags),
                ));
            }
            (
                PakDigest::from_stored(raw_digest),
                flags & ENTRY_FLAG_ENCRYPTED != 0,
            )
        } else {
            (None, false)
        };

        match data_offset.checked_add(compressed_size) {
            Some(end) if end <= data_end => {}
            _ => {
                return Err(Error::corrupt(
                    archive,
                    start,
                    format!(
                        "entry {} payload {:#x}+{:#x} leaves the data region ending at {:#x}",
                        index, data_offset, compressed_size, data_end
                    ),
                ))
            }
        }

        if compression == Compression::Stored && compressed_size != uncompressed_size {
            return Err(Error::corrupt(
                archive,
                start,
                format!(
                    "stored entry {} has sizes {} and {}",
                    index, compressed_size, uncompressed_size
                ),
            ));
        }

        match lookup.entry(path.as_str().to_string()) {
            Entry::Occupied(slot) => {
                return Err(Error::DuplicatePath {
                    archive: archive.to_string(),
                    path: path.to_string(),
                    first: *slot.get(),
                    second: index,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
        }

        tracing::trace!(
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", cur.offset()),
            path = %path,
            "deserialized EntryRecord"
        );

        entries.push(EntryRecord {
            path,
            data_offset,
            compressed_size,
            uncompressed_size,
            compression,
            digest,
            encrypted,
            index,
        });
    }

    if cur.remaining() != 0 {
        return Err(Error::corrupt(
            archive,
            cur.offset(),
            format!("{} bytes left over after the last entry", cur.remaining()),
        ));
    }

    let (overlaps, overlap_of) = find_overlaps(archive, &entries);

    tracing::debug!(
        start = format_args!("{:#x}", footer.index_offset),
        end = format_args!("{:#x}", footer.index_offset + footer.index_size),
        entries = entries.len(),
        overlaps = overlaps.len(),
        "deserialized PakIndex"
    );

    Ok(PakIndex {
        entries,
        lookup,
        overlaps,
        overlap_of,
    })
}

/// One sweep over the payloads sorted by offset. An entry starting before the
/// furthest end seen so far joins the current group.
fn find_overlaps(
    archive: &str,
    entries: &[EntryRecord],
) -> (Vec<OverlapGroup>, Vec<Option<usize>>) {
    let mut order: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].compressed_size > 0)
        .collect();
    order.sort_by_key(|&i| entries[i].data_offset);

    let mut groups = vec![];
    let mut current = OverlapGroup {
        range: 0..0,
        entries: vec![],
    };
    for &i in &order {
        let range = entries[i].data_range();
        if !current.entries.is_empty() && range.start < current.range.end {
            current.range.end = current.range.end.max(range.end);
            current.entries.push(i);
        } else {
            let done = std::mem::replace(
                &mut current,
                OverlapGroup {
                    range,
                    entries: vec![i],
                },
            );
            if done.entries.len() > 1 {
                groups.push(done);
            }
        }
    }
    if current.entries.len() > 1 {
        groups.push(current);
    }

    for group in &mut groups {
        group.entries.sort_unstable();
    }
    groups.sort_unstable_by_key(|g| g.entries[0]);

    let mut overlap_of = vec![None; entries.len()];
    for (id, group) in groups.iter().enumerate() {
        tracing::warn!(
            archive,
            entries = group.entries.len(),
            first = %entries[group.entries[0]].path,
            start = format_args!("{:#x}", group.range.start),
            end = format_args!("{:#x}", group.range.end),
            "entry payloads overlap"
        );
        for &i in &group.entries {
            overlap_of[i] = Some(id);
        }
    }

    (groups, overlap_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Sha1Checksum;
    use crate::error::ErrorKind;
    use crate::header::{FooterLayout, MAGIC_BYTES};
    use crate::source::MemorySource;
    use byteorder::WriteBytesExt;

    struct RawEntry<'a> {
        path: &'a [u8],
        offset: u64,
        compressed: u64,
        uncompressed: u64,
        method: u32,
        flags: u8,
    }

    fn raw(path: &str, offset: u64, len: u64) -> RawEntry<'_> {
        RawEntry {
            path: path.as_bytes(),
            offset,
            compressed: len,
            uncompressed: len,
            method: 0,
            flags: 0,
        }
    }

    fn index_bytes(entries: &[RawEntry<'_>], hashed: bool) -> Vec<u8> {
        let mut out = vec![];
        out.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
        for e in entries {
            out.write_u32::<LittleEndian>(e.path.len() as u32).unwrap();
            out.extend_from_slice(e.path);
            out.write_u64::<LittleEndian>(e.offset).unwrap();
            out.write_u64::<LittleEndian>(e.compressed).unwrap();
            out.write_u64::<LittleEndian>(e.uncompressed).unwrap();
            out.write_u32::<LittleEndian>(e.method).unwrap();
            if hashed {
                out.extend_from_slice(&[0u8; DIGEST_LEN]);
                out.write_u8(e.flags).unwrap();
            }
        }
        out
    }

    /// `data_len` zero bytes of payload, then the index, then a footer.
    fn archive(data_len: usize, index: &[u8], version: u32, hash_index: bool) -> Vec<u8> {
        let mut out = vec![0u8; data_len];
        out.extend_from_slice(index);
        out.write_u64::<LittleEndian>(data_len as u64).unwrap();
        out.write_u64::<LittleEndian>(index.len() as u64).unwrap();
        if FooterLayout::for_version(version) == Some(FooterLayout::Hashed) {
            let digest = if hash_index {
                Sha1Checksum.digest(index).0
            } else {
                [0u8; DIGEST_LEN]
            };
            out.extend_from_slice(&digest);
        }
        out.write_u32::<LittleEndian>(version).unwrap();
        out.extend_from_slice(MAGIC_BYTES);
        out
    }

    fn parse(data: Vec<u8>) -> Result<PakIndex> {
        let source = MemorySource::new(data);
        let footer = crate::footer::read_footer(&source)?;
        read_index(&source, &footer, &Sha1Checksum)
    }

    #[test]
    fn decodes_entries_in_order() {
        let index = index_bytes(&[raw("a/b.txt", 0, 5), raw("c.bin", 5, 3)], true);
        let parsed = parse(archive(8, &index, 15, true)).unwrap();
        assert_eq!(parsed.len(), 2);
        let paths: Vec<_> = parsed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["a/b.txt", "c.bin"]);
        let c = parsed.get("c.bin").unwrap();
        assert_eq!(c.data_offset, 5);
        assert_eq!(c.compressed_size, 3);
        assert_eq!(c.index(), 1);
        assert!(parsed.overlaps().is_empty());
    }

    #[test]
    fn strips_one_trailing_nul() {
        let index = index_bytes(
            &[RawEntry {
                path: b"name.txt\0",
                ..raw("", 0, 1)
            }],
            true,
        );
        let parsed = parse(archive(1, &index, 15, false)).unwrap();
        assert!(parsed.get("name.txt").is_some());
    }

    #[test]
    fn legacy_entries_have_no_digest() {
        let index = index_bytes(&[raw("x", 0, 4)], false);
        let parsed = parse(archive(4, &index, 7, false)).unwrap();
        let x = parsed.get("x").unwrap();
        assert_eq!(x.digest, None);
        assert!(!x.encrypted);
    }

    #[test]
    fn flipped_index_byte_fails_hash() {
        let index = index_bytes(&[raw("a", 0, 2)], true);
        let mut data = archive(2, &index, 15, true);
        // First byte of the path.
        data[2 + 8] ^= 0x20;
        assert_eq!(parse(data).unwrap_err().kind(), ErrorKind::IndexHashMismatch);
    }

    #[test]
    fn duplicate_paths() {
        let index = index_bytes(&[raw("a", 0, 1), raw("b", 1, 1), raw("a", 2, 1)], true);
        match parse(archive(3, &index, 15, false)).unwrap_err() {
            Error::DuplicatePath {
                path,
                first,
                second,
                ..
            } => {
                assert_eq!(path, "a");
                assert_eq!((first, second), (0, 2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn traversal_paths() {
        let index = index_bytes(&[raw("../evil", 0, 1)], true);
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::PathTraversalRejected
        );
    }

    #[test]
    fn payload_past_data_region() {
        let index = index_bytes(&[raw("a", 2, 4)], true);
        assert_eq!(
            parse(archive(4, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );

        let index = index_bytes(&[raw("a", u64::MAX, 4)], true);
        assert_eq!(
            parse(archive(4, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );
    }

    #[test]
    fn corrupt_shapes() {
        // Count larger than the index can hold.
        let mut index = index_bytes(&[raw("a", 0, 1)], true);
        index[0] = 200;
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );

        // Trailing garbage.
        let mut index = index_bytes(&[raw("a", 0, 1)], true);
        index.extend_from_slice(&[1, 2, 3]);
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );

        // Unknown flag bits.
        let index = index_bytes(
            &[RawEntry {
                flags: 0x82,
                ..raw("a", 0, 1)
            }],
            true,
        );
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );

        // Stored with differing sizes.
        let index = index_bytes(
            &[RawEntry {
                uncompressed: 9,
                ..raw("a", 0, 1)
            }],
            true,
        );
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );

        // Not UTF-8.
        let index = index_bytes(
            &[RawEntry {
                path: &[0xff, 0xfe],
                ..raw("", 0, 1)
            }],
            true,
        );
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );
    }

    #[test]
    fn empty_path_is_corrupt() {
        let index = index_bytes(
            &[RawEntry {
                path: b"\0",
                ..raw("", 0, 1)
            }],
            true,
        );
        assert_eq!(
            parse(archive(1, &index, 15, false)).unwrap_err().kind(),
            ErrorKind::CorruptIndex
        );
    }

    #[test]
    fn overlaps_are_flagged_not_rejected() {
        let index = index_bytes(
            &[raw("a", 0, 4), raw("b", 2, 4), raw("c", 6, 2), raw("empty", 3, 0)],
            true,
        );
        let parsed = parse(archive(8, &index, 15, false)).unwrap();
        assert_eq!(
            parsed.overlaps(),
            &[OverlapGroup {
                range: 0..6,
                entries: vec![0, 1],
            }]
        );
        assert_eq!(parsed.overlap_group(1), parsed.overlap_group(0));
        assert_eq!(parsed.overlap_group(2), None);
        assert_eq!(parsed.overlap_group(3), None);
        assert_eq!(parsed.overlapping_entries(), 2);
        assert_eq!(parsed.total_compressed(), 10);
    }

    #[test]
    fn shared_payload_forms_a_single_group() {
        let names: Vec<String> = (0..5000).map(|i| format!("shared/{}.bin", i)).collect();
        let mut raws: Vec<RawEntry<'_>> = names.iter().map(|n| raw(n, 0, 1)).collect();
        raws.push(raw("apart.bin", 1, 1));
        let index = index_bytes(&raws, true);

        let parsed = parse(archive(2, &index, 15, false)).unwrap();
        assert_eq!(parsed.len(), 5001);
        assert_eq!(parsed.overlaps().len(), 1);
        let group = &parsed.overlaps()[0];
        assert_eq!(group.range, 0..1);
        assert_eq!(group.entries, (0..5000).collect::<Vec<_>>());
        assert_eq!(parsed.overlapping_entries(), 5000);
        assert_eq!(parsed.overlap_group(5000), None);
    }

    #[test]
    fn chained_ranges_join_one_group() {
        let index = index_bytes(
            &[raw("c", 8, 4), raw("a", 0, 5), raw("b", 4, 5), raw("d", 12, 1)],
            true,
        );
        let parsed = parse(archive(13, &index, 15, false)).unwrap();
        assert_eq!(
            parsed.overlaps(),
            &[OverlapGroup {
                range: 0..12,
                entries: vec![0, 1, 2],
            }]
        );
    }

    #[test]
    fn encrypted_flag() {
        let index = index_bytes(
            &[RawEntry {
                flags: ENTRY_FLAG_ENCRYPTED,
                method: 1,
                uncompressed: 10,
                ..raw("secret", 0, 1)
            }],
            true,
        );
        let parsed = parse(archive(1, &index, 15, false)).unwrap();
        let secret = parsed.get("secret").unwrap();
        assert!(secret.encrypted);
        assert_eq!(secret.compression, Compression::Zlib);
    }
}
