//! Digest service used for both index and per-entry integrity checks.

use std::fmt;

use digest::Digest;

/// Width of every digest stored in the archive.
pub const DIGEST_LEN: usize = 20;

/// A fixed-width digest as stored in the footer and in index entries.
///
/// An all-zero value on disk means "no digest recorded".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PakDigest(pub [u8; DIGEST_LEN]);

impl PakDigest {
    pub const ZERO: PakDigest = PakDigest([0u8; DIGEST_LEN]);

    /// Interpret raw on-disk bytes, mapping the all-zero value to `None`.
    pub fn from_stored(bytes: [u8; DIGEST_LEN]) -> Option<PakDigest> {
        if bytes == [0u8; DIGEST_LEN] {
            None
        } else {
            Some(PakDigest(bytes))
        }
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PakDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PakDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PakDigest({})", self.to_hex())
    }
}

/// A checksum algorithm producing [`PakDigest`] values.
pub trait Checksum: Send + Sync {
    /// Short algorithm name, shown by `info`.
    fn name(&self) -> &'static str;

    fn digest(&self, data: &[u8]) -> PakDigest;
}

/// SHA-1, the algorithm the format pins for all digests.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Checksum;

impl Checksum for Sha1Checksum {
    fn name(&self) -> &'static str {
        "sha1"
    }

    fn digest(&self, data: &[u8]) -> PakDigest {
        let hash = sha1::Sha1::digest(data);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&hash);
        PakDigest(out)
    }
}
