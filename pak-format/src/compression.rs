use std::fmt;
#[cfg(any(feature = "zlib", feature = "zstd"))]
use std::io::Read;
use std::sync::Arc;

pub mod constants {
    pub const COMPRESSION_STORED: u32 = 0x00;
    pub const COMPRESSION_ZLIB: u32 = 0x01;
    pub const COMPRESSION_GZIP: u32 = 0x02;
    pub const COMPRESSION_ZSTD: u32 = 0x03;
    pub const COMPRESSION_OODLE: u32 = 0x04;
}

use self::constants::*;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Compression {
    #[default]
    Stored,
    Zlib,
    Gzip,
    Zstd,
    /// Proprietary codec. Never built in; callers supply their own [`Decompressor`].
    Oodle,
    Unknown(u32),
}

impl Compression {
    pub const fn available_variants() -> &'static [&'static str] {
        &["stored", "zlib", "gzip", "zstd"]
    }

    pub const fn from_id(id: u32) -> Compression {
        match id {
            COMPRESSION_STORED => Compression::Stored,
            COMPRESSION_ZLIB => Compression::Zlib,
            COMPRESSION_GZIP => Compression::Gzip,
            COMPRESSION_ZSTD => Compression::Zstd,
            COMPRESSION_OODLE => Compression::Oodle,
            id => Compression::Unknown(id),
        }
    }

    pub const fn id(self) -> u32 {
        use Compression::*;

        match self {
            Stored => COMPRESSION_STORED,
            Zlib => COMPRESSION_ZLIB,
            Gzip => COMPRESSION_GZIP,
            Zstd => COMPRESSION_ZSTD,
            Oodle => COMPRESSION_OODLE,
            Unknown(id) => id,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Compression::*;

        let s = match self {
            Stored => "stored",
            Zlib => "zlib",
            Gzip => "gzip",
            Zstd => "Zstandard",
            Oodle => "Oodle",
            Unknown(id) => return write!(f, "Unknown(id: {:x})", id),
        };

        write!(f, "{}", s)
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::str::FromStr for Compression {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stored" | "none" => Ok(Compression::Stored),
            "zlib" => Ok(Compression::Zlib),
            "gzip" => Ok(Compression::Gzip),
            "zstd" | "zstandard" => Ok(Compression::Zstd),
            "oodle" => Ok(Compression::Oodle),
            _ => Err(CodecError::UnknownName(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("no codec available for {0}")]
    Unsupported(Compression),

    #[error("unknown compression method name: {0}")]
    UnknownName(String),

    #[error("codec reported an error")]
    Failed(#[source] Arc<std::io::Error>),

    #[error("decompressed length {actual} does not match expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Failed(Arc::new(e))
    }
}

/// Decompression service keyed by method.
///
/// The reader only ever talks to codecs through this trait, so proprietary
/// methods can be plugged in without the crate knowing their internals.
pub trait Decompressor: Send + Sync {
    fn decompress(
        &self,
        method: Compression,
        input: &[u8],
        expected_len: u64,
    ) -> Result<Vec<u8>, CodecError>;
}

/// The codecs compiled into this crate: stored, zlib and gzip (`zlib` feature)
/// and Zstandard (`zstd` feature).
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecompressor;

impl Decompressor for StandardDecompressor {
    fn decompress(
        &self,
        method: Compression,
        input: &[u8],
        expected_len: u64,
    ) -> Result<Vec<u8>, CodecError> {
        use Compression::*;

        let out = match method {
            Stored => input.to_vec(),
            #[cfg(feature = "zlib")]
            Zlib => read_bounded(flate2::read::ZlibDecoder::new(input), expected_len)?,
            #[cfg(feature = "zlib")]
            Gzip => read_bounded(flate2::read::GzDecoder::new(input), expected_len)?,
            #[cfg(feature = "zstd")]
            Zstd => read_bounded(zstd::stream::read::Decoder::new(input)?, expected_len)?,
            #[allow(unreachable_patterns)]
            missing => return Err(CodecError::Unsupported(missing)),
        };

        if out.len() as u64 != expected_len {
            return Err(CodecError::LengthMismatch {
                expected: expected_len,
                actual: out.len() as u64,
            });
        }

        Ok(out)
    }
}

/// Reads at most one byte past `expected_len`, which is enough to detect an
/// oversized stream without inflating all of it.
#[cfg(any(feature = "zlib", feature = "zstd"))]
fn read_bounded<R: Read>(reader: R, expected_len: u64) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len.min(64 * 1024 * 1024) as usize);
    reader
        .take(expected_len.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Compress a whole buffer. Used by the writer.
#[cfg(feature = "writer")]
pub fn compress_bytes(method: Compression, input: &[u8]) -> Result<Vec<u8>, CodecError> {
    #[cfg(feature = "zlib")]
    use std::io::Write;

    use Compression::*;

    match method {
        Stored => Ok(input.to_vec()),
        #[cfg(feature = "zlib")]
        Zlib => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(input)?;
            Ok(encoder.finish()?)
        }
        #[cfg(feature = "zlib")]
        Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(input)?;
            Ok(encoder.finish()?)
        }
        #[cfg(feature = "zstd")]
        Zstd => Ok(zstd::stream::encode_all(input, 0)?),
        #[allow(unreachable_patterns)]
        missing => Err(CodecError::Unsupported(missing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_enum() {
        for id in 0..=5 {
            assert_eq!(Compression::from_id(id).id(), id);
        }
        assert_eq!(Compression::from_id(9), Compression::Unknown(9));
    }

    #[test]
    fn stored_passes_through() {
        let out = StandardDecompressor
            .decompress(Compression::Stored, b"abc", 3)
            .unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn stored_length_mismatch() {
        let err = StandardDecompressor
            .decompress(Compression::Stored, b"abc", 4)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn oodle_is_not_built_in() {
        let err = StandardDecompressor
            .decompress(Compression::Oodle, b"abc", 3)
            .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(Compression::Oodle)));
    }

    #[cfg(all(feature = "zlib", feature = "writer"))]
    #[test]
    fn zlib_and_gzip_decode() {
        let data = b"This, this, this, this, this is a compressable string string string.\n";
        for method in [Compression::Zlib, Compression::Gzip] {
            let packed = compress_bytes(method, data).unwrap();
            let out = StandardDecompressor
                .decompress(method, &packed, data.len() as u64)
                .unwrap();
            assert_eq!(out, data);
        }
    }

    #[cfg(all(feature = "zstd", feature = "writer"))]
    #[test]
    fn zstd_oversized_output_is_rejected() {
        let data = vec![7u8; 4096];
        let packed = compress_bytes(Compression::Zstd, &data).unwrap();
        let err = StandardDecompressor
            .decompress(Compression::Zstd, &packed, 100)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthMismatch {
                expected: 100,
                actual: 101
            }
        ));
    }

    #[cfg(feature = "zlib")]
    #[test]
    fn garbage_fails() {
        let err = StandardDecompressor
            .decompress(Compression::Zlib, b"definitely not zlib", 10)
            .unwrap_err();
        assert!(matches!(err, CodecError::Failed(_)));
    }
}
