//! Reading, extracting and writing PAK game archives.
//!
//! An archive is a run of entry payloads followed by an index and a fixed
//! footer. [`PakReader`] locates the footer, decodes the index and extracts
//! entries by their logical path:
//!
//! ```no_run
//! use pak_format::{ExtractOptions, PakReader};
//!
//! # fn main() -> pak_format::Result<()> {
//! let reader = PakReader::open_file("pakchunk0.pak")?;
//! for entry in reader.entries()? {
//!     println!("{} ({} bytes)", entry.path, entry.uncompressed_size);
//! }
//! reader.extract_all("out", &ExtractOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod compression;
mod error;
pub mod extract;
pub mod footer;
pub mod header;
pub mod index;
pub mod path;
mod reader;
mod record;
pub mod source;
#[cfg(feature = "writer")]
mod writer;

pub use checksum::{Checksum, PakDigest, Sha1Checksum};
pub use compression::{CodecError, Compression, Decompressor, StandardDecompressor};
pub use error::{Error, ErrorKind, ReaderState, Result};
pub use extract::{
    CancelToken, Decryptor, EntryExtractor, ExtractOptions, ExtractReport, ExtractStats,
    ExtractionResult, PathPrefixes, ValidateStats,
};
pub use header::{FooterLayout, PakFooter, PakHeader};
pub use index::{OverlapGroup, PakIndex};
pub use path::PakPath;
pub use reader::{ArchiveInfo, PakReader};
pub use record::{EntryRecord, ENTRY_FLAG_ENCRYPTED};
pub use source::{ByteSource, FileSource, MemorySource, MmapSource};
#[cfg(feature = "writer")]
pub use writer::PakWriter;
