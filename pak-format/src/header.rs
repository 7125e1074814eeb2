use crate::checksum::{PakDigest, DIGEST_LEN};

pub const MAGIC_BYTES: &[u8; 4] = b"PAK\0";

/// Newest version this crate reads and the version the writer emits by default.
pub const VERSION: u32 = 15;
pub const MIN_VERSION: u32 = 1;
/// First version whose footer carries an index digest and whose entries
/// carry a content digest and flags byte.
pub const FIRST_HASHED_VERSION: u32 = 8;

/// Magic plus version: the trailing 8 bytes of every footer.
pub(crate) const FOOTER_TAG_LEN: usize = 8;
pub(crate) const HEADER_LEN: usize = 8;

/// Optional leading header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PakHeader {
    pub version: u32,
}

/// Footer layouts, pinned per version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterLayout {
    /// Versions 1..=7: offset, size, version, magic.
    Legacy,
    /// Versions 8..=15: offset, size, SHA-1 of the index, version, magic.
    Hashed,
}

impl FooterLayout {
    pub const MAX_LEN: usize = 44;

    pub fn for_version(version: u32) -> Option<FooterLayout> {
        match version {
            MIN_VERSION..=7 => Some(FooterLayout::Legacy),
            FIRST_HASHED_VERSION..=VERSION => Some(FooterLayout::Hashed),
            _ => None,
        }
    }

    pub const fn len(self) -> usize {
        match self {
            FooterLayout::Legacy => 8 + 8 + FOOTER_TAG_LEN,
            FooterLayout::Hashed => 8 + 8 + DIGEST_LEN + FOOTER_TAG_LEN,
        }
    }

    pub const fn has_index_digest(self) -> bool {
        matches!(self, FooterLayout::Hashed)
    }
}

/// Decoded trailer describing where the index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PakFooter {
    pub version: u32,
    pub layout: FooterLayout,
    pub index_offset: u64,
    pub index_size: u64,
    pub index_digest: Option<PakDigest>,
    /// Absolute offset of the first footer byte.
    pub footer_offset: u64,
}

impl PakFooter {
    /// Entries carry a digest and a flags byte from this version on.
    #[inline(always)]
    pub fn entries_hashed(&self) -> bool {
        self.version >= FIRST_HASHED_VERSION
    }

    /// End of the region entry payloads may occupy.
    #[inline(always)]
    pub fn data_end(&self) -> u64 {
        self.footer_offset
    }
}
