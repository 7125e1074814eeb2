use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::checksum::{Checksum, PakDigest, Sha1Checksum};
use crate::compression::{compress_bytes, CodecError, Compression};
use crate::error::{Error, Result};
use crate::header::{FooterLayout, FIRST_HASHED_VERSION, MAGIC_BYTES, VERSION};
use crate::path::{IntoPakPathError, PakPath};
use crate::record::EntryRecord;

/// Writes an archive front to back: optional header, payloads, index, footer.
pub struct PakWriter<W: Write> {
    inner: W,
    label: PathBuf,
    version: u32,
    layout: FooterLayout,
    pos: u64,
    entries: Vec<EntryRecord>,
    lookup: HashMap<String, usize>,
    checksum: Box<dyn Checksum>,
}

impl<W: Write> std::fmt::Debug for PakWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PakWriter")
            .field("label", &self.label)
            .field("version", &self.version)
            .field("pos", &self.pos)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl PakWriter<BufWriter<File>> {
    /// Create a new archive at `path` at the current version, with a leading header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<PakWriter<BufWriter<File>>> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = PakWriter::with_header(BufWriter::new(file), VERSION)?;
        writer.label = path.to_path_buf();
        Ok(writer)
    }
}

impl<W: Write> PakWriter<W> {
    /// Start an archive without a leading header.
    pub fn new(inner: W, version: u32) -> Result<PakWriter<W>> {
        let layout = FooterLayout::for_version(version).ok_or_else(|| Error::UnsupportedVersion {
            archive: "<writer>".to_string(),
            version,
        })?;

        Ok(PakWriter {
            inner,
            label: PathBuf::from("<writer>"),
            version,
            layout,
            pos: 0,
            entries: vec![],
            lookup: HashMap::new(),
            checksum: Box::new(Sha1Checksum),
        })
    }

    /// Start an archive that begins with the magic and version.
    pub fn with_header(inner: W, version: u32) -> Result<PakWriter<W>> {
        let mut writer = PakWriter::new(inner, version)?;
        writer.write_all(MAGIC_BYTES)?;
        writer.write_all(&version.to_le_bytes())?;
        Ok(writer)
    }

    pub fn with_checksum<C: Checksum + 'static>(mut self, checksum: C) -> Self {
        self.checksum = Box::new(checksum);
        self
    }

    #[inline(always)]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .write_all(data)
            .map_err(|e| Error::io(&self.label, e))?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn hashed(&self) -> bool {
        self.version >= FIRST_HASHED_VERSION
    }

    /// Compress and append `data` under `path`.
    pub fn add(&mut self, path: &str, data: &[u8], compression: Compression) -> Result<&EntryRecord> {
        let payload = compress_bytes(compression, data).map_err(|e| match e {
            CodecError::Unsupported(method) => Error::UnsupportedMethod {
                path: path.to_string(),
                method: method.id(),
            },
            e => Error::io(
                &self.label,
                std::io::Error::new(std::io::ErrorKind::Other, e),
            ),
        })?;

        let digest = if self.hashed() {
            Some(self.checksum.digest(data))
        } else {
            None
        };

        self.add_raw(path, &payload, data.len() as u64, compression, digest, false)
    }

    /// Append an already-encoded payload verbatim.
    ///
    /// Nothing is checked about `payload`; this is how encrypted or
    /// externally compressed entries get written.
    pub fn add_raw(
        &mut self,
        path: &str,
        payload: &[u8],
        uncompressed_size: u64,
        compression: Compression,
        digest: Option<PakDigest>,
        encrypted: bool,
    ) -> Result<&EntryRecord> {
        let path = PakPath::new(path).map_err(|e| match e {
            IntoPakPathError::Traversal => Error::PathTraversalRejected {
                path: path.to_string(),
            },
            e => Error::corrupt(
                &self.label.display().to_string(),
                self.pos,
                format!("cannot store path {:?}: {}", path, e),
            ),
        })?;

        if !self.hashed() && (digest.is_some() || encrypted) {
            return Err(Error::corrupt(
                &self.label.display().to_string(),
                self.pos,
                format!(
                    "version {} entries carry no digest or flags ({})",
                    self.version, path
                ),
            ));
        }

        let index = self.entries.len();
        if let Some(&first) = self.lookup.get(path.as_str()) {
            return Err(Error::DuplicatePath {
                archive: self.label.display().to_string(),
                path: path.to_string(),
                first,
                second: index,
            });
        }

        let data_offset = self.pos;
        self.write_all(payload)?;

        tracing::debug!(
            start = format_args!("{:#x}", data_offset),
            end = format_args!("{:#x}", self.pos),
            path = %path,
            method = %compression,
            "wrote entry"
        );

        self.lookup.insert(path.as_str().to_string(), index);
        self.entries.push(EntryRecord {
            path,
            data_offset,
            compressed_size: payload.len() as u64,
            uncompressed_size,
            compression,
            digest,
            encrypted,
            index,
        });
        Ok(&self.entries[index])
    }

    fn encode_index(&self) -> std::io::Result<Vec<u8>> {
        let mut out = vec![];
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for entry in &self.entries {
            let path = entry.path.as_str().as_bytes();
            out.write_u32::<LittleEndian>(path.len() as u32)?;
            out.write_all(path)?;
            out.write_u64::<LittleEndian>(entry.data_offset)?;
            out.write_u64::<LittleEndian>(entry.compressed_size)?;
            out.write_u64::<LittleEndian>(entry.uncompressed_size)?;
            out.write_u32::<LittleEndian>(entry.compression.id())?;
            if self.hashed() {
                out.write_all(entry.digest.unwrap_or(PakDigest::ZERO).as_bytes())?;
                out.write_u8(entry.flags())?;
            }
        }
        Ok(out)
    }

    fn encode_footer(&self, index_offset: u64, index: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.layout.len());
        out.write_u64::<LittleEndian>(index_offset)?;
        out.write_u64::<LittleEndian>(index.len() as u64)?;
        if self.layout.has_index_digest() {
            out.write_all(self.checksum.digest(index).as_bytes())?;
        }
        out.write_u32::<LittleEndian>(self.version)?;
        out.write_all(MAGIC_BYTES)?;
        Ok(out)
    }

    /// Write the index and footer, returning the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let index = self.encode_index().map_err(|e| Error::io(&self.label, e))?;
        let index_offset = self.pos;
        self.write_all(&index)?;

        let footer = self
            .encode_footer(index_offset, &index)
            .map_err(|e| Error::io(&self.label, e))?;
        self.write_all(&footer)?;
        self.inner.flush().map_err(|e| Error::io(&self.label, e))?;

        tracing::debug!(
            entries = self.entries.len(),
            index_offset = format_args!("{:#x}", index_offset),
            index_size = index.len(),
            size = self.pos,
            "finished archive"
        );

        Ok(self.inner)
    }
}
