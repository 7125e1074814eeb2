//! Locating the index: the trailing footer and the optional leading header.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::checksum::{PakDigest, DIGEST_LEN};
use crate::error::{Error, Result};
use crate::header::{
    FooterLayout, PakFooter, PakHeader, FOOTER_TAG_LEN, HEADER_LEN, MAGIC_BYTES,
};
use crate::source::ByteSource;

fn truncated(source: &dyn ByteSource, offset: u64, needed: u64) -> Error {
    Error::TruncatedArchive {
        archive: source.label().to_string(),
        offset,
        needed,
        size: source.size(),
    }
}

/// Read the optional leading header. Returns `None` when the archive does not
/// start with the magic bytes.
pub fn read_header(source: &dyn ByteSource) -> Result<Option<PakHeader>> {
    if source.size() < HEADER_LEN as u64 {
        return Ok(None);
    }

    let buf = source.read_at(0, HEADER_LEN)?;
    if &buf[..4] != MAGIC_BYTES {
        return Ok(None);
    }

    let version = (&buf[4..]).read_u32::<LittleEndian>().map_err(|e| Error::io(source.label(), e))?;
    tracing::debug!(version, "deserialized PakHeader");
    Ok(Some(PakHeader { version }))
}

/// True if `tail` ends with the first two or three bytes of the magic, which
/// is what a footer looks like after losing its last byte or two.
fn ends_with_cut_magic(tail: &[u8]) -> bool {
    (2..MAGIC_BYTES.len()).any(|n| tail.ends_with(&MAGIC_BYTES[..n]))
}

/// Parse and validate the footer at the end of `source`.
///
/// When the trailing magic is missing the archive is reported as
/// [`Error::TruncatedArchive`] if it is smaller than the largest footer,
/// starts with the header magic, or ends in a cut-off magic (`PA`, `PAK`).
/// Anything else is [`Error::InvalidFormat`]: a headerless archive that lost
/// three or more trailing bytes cannot be told apart from foreign data.
pub fn read_footer(source: &dyn ByteSource) -> Result<PakFooter> {
    let archive = source.label();
    let size = source.size();

    if size < FOOTER_TAG_LEN as u64 {
        return Err(truncated(source, 0, FooterLayout::MAX_LEN as u64));
    }

    let tag_offset = size - FOOTER_TAG_LEN as u64;
    let tag = source.read_at(tag_offset, FOOTER_TAG_LEN)?;
    let mut found = [0u8; 4];
    found.copy_from_slice(&tag[4..]);

    if &found != MAGIC_BYTES {
        if size < FooterLayout::MAX_LEN as u64
            || ends_with_cut_magic(&tag)
            || read_header(source)?.is_some()
        {
            return Err(truncated(
                source,
                size.saturating_sub(FooterLayout::MAX_LEN as u64),
                FooterLayout::MAX_LEN as u64,
            ));
        }
        return Err(Error::InvalidFormat {
            archive: archive.to_string(),
            offset: tag_offset + 4,
            expected: *MAGIC_BYTES,
            found,
        });
    }

    let version = (&tag[..4])
        .read_u32::<LittleEndian>()
        .map_err(|e| Error::io(archive, e))?;

    let layout = FooterLayout::for_version(version).ok_or_else(|| Error::UnsupportedVersion {
        archive: archive.to_string(),
        version,
    })?;

    let footer_len = layout.len() as u64;
    if size < footer_len {
        return Err(truncated(source, 0, footer_len));
    }

    let footer_offset = size - footer_len;
    let buf = source.read_at(footer_offset, layout.len())?;
    let mut cursor = &buf[..];
    let read_err = |e: std::io::Error| Error::io(archive, e);

    let index_offset = cursor.read_u64::<LittleEndian>().map_err(read_err)?;
    let index_size = cursor.read_u64::<LittleEndian>().map_err(read_err)?;
    let index_digest = if layout.has_index_digest() {
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&cursor[..DIGEST_LEN]);
        PakDigest::from_stored(raw)
    } else {
        None
    };

    // The index must sit entirely before the footer.
    match index_offset.checked_add(index_size) {
        Some(end) if end <= footer_offset => {}
        _ => {
            return Err(Error::corrupt(
                archive,
                footer_offset,
                format!(
                    "index range {:#x}+{:#x} overlaps the footer at {:#x}",
                    index_offset, index_size, footer_offset
                ),
            ))
        }
    }

    tracing::debug!(
        start = format_args!("{:#x}", footer_offset),
        end = format_args!("{:#x}", size),
        version,
        index_offset = format_args!("{:#x}", index_offset),
        index_size,
        hashed = index_digest.is_some(),
        "deserialized PakFooter"
    );

    Ok(PakFooter {
        version,
        layout,
        index_offset,
        index_size,
        index_digest,
        footer_offset,
    })
}

/// Read the footer, then check that a leading header (if any) agrees with it.
pub fn read_trailer(source: &dyn ByteSource) -> Result<(PakFooter, Option<PakHeader>)> {
    let footer = read_footer(source)?;
    let header = read_header(source)?;

    if let Some(header) = header {
        if header.version != footer.version {
            return Err(Error::VersionMismatch {
                archive: source.label().to_string(),
                header: header.version,
                footer: footer.version,
            });
        }
    }

    Ok((footer, header))
}
