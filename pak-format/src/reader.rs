use std::fmt;
use std::path::{Path, PathBuf};

use crate::checksum::{Checksum, PakDigest, Sha1Checksum};
use crate::compression::{Decompressor, StandardDecompressor};
use crate::error::{Error, ReaderState, Result};
use crate::extract::{
    Decryptor, EntryExtractor, ExtractOptions, ExtractReport, ValidateStats,
};
use crate::footer::read_trailer;
use crate::header::{PakFooter, PakHeader};
use crate::index::{read_index, PakIndex};
use crate::path::contains_traversal;
use crate::record::EntryRecord;
use crate::source::{ByteSource, FileSource};

struct Loaded<S> {
    source: S,
    header: Option<PakHeader>,
    footer: PakFooter,
    index: PakIndex,
}

enum State<S> {
    Unopened(PathBuf),
    Opened(S),
    IndexLoaded(Box<Loaded<S>>),
    /// Holds the error that caused the failure, returned again on every call.
    Failed(Error),
    Closed,
}

impl<S> State<S> {
    fn kind(&self) -> ReaderState {
        match self {
            State::Unopened(_) => ReaderState::Unopened,
            State::Opened(_) => ReaderState::Opened,
            State::IndexLoaded(_) => ReaderState::IndexLoaded,
            State::Failed(_) => ReaderState::Failed,
            State::Closed => ReaderState::Closed,
        }
    }
}

/// Summary of an opened archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub label: String,
    pub file_size: u64,
    pub version: u32,
    pub has_header: bool,
    pub index_offset: u64,
    pub index_size: u64,
    pub index_digest: Option<PakDigest>,
    /// Name of the digest algorithm in use.
    pub checksum: &'static str,
    pub entry_count: usize,
    pub total_compressed: u64,
    pub total_uncompressed: u64,
    pub encrypted_entries: usize,
    /// Groups of entries sharing payload bytes.
    pub overlap_groups: usize,
    pub overlapping_entries: usize,
}

/// Reads an archive: footer first, then the index, then entries on demand.
///
/// The reader moves through `Unopened → Opened → IndexLoaded`, and ends in
/// `Closed` or `Failed`. Once failed, every call returns the original error.
pub struct PakReader<S: ByteSource = FileSource> {
    state: State<S>,
    decompressor: Box<dyn Decompressor>,
    checksum: Box<dyn Checksum>,
    decryptor: Option<Box<dyn Decryptor>>,
}

impl<S: ByteSource> fmt::Debug for PakReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PakReader");
        s.field("state", &self.state.kind());
        match &self.state {
            State::Unopened(path) => s.field("path", path),
            State::Opened(source) => s.field("archive", &source.label()),
            State::IndexLoaded(loaded) => s
                .field("archive", &loaded.source.label())
                .field("footer", &loaded.footer)
                .field("entries", &loaded.index.len()),
            State::Failed(e) => s.field("error", e),
            State::Closed => &mut s,
        };
        s.field("checksum", &self.checksum.name())
            .finish_non_exhaustive()
    }
}

impl PakReader<FileSource> {
    /// A reader for the archive at `path`. Nothing is touched until [`open`](Self::open).
    pub fn new<P: AsRef<Path>>(path: P) -> PakReader<FileSource> {
        PakReader::from_state(State::Unopened(path.as_ref().to_path_buf()))
    }

    /// Open the file and load its index in one go.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<PakReader<FileSource>> {
        let mut reader = PakReader::new(path);
        reader.open()?;
        reader.load_index()?;
        Ok(reader)
    }

    pub fn open(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Unopened(path) => match FileSource::open(&path) {
                Ok(source) => {
                    tracing::debug!(archive = %path.display(), size = source.size(), "opened archive");
                    self.state = State::Opened(source);
                    Ok(())
                }
                Err(e) => {
                    self.state = State::Failed(e.clone());
                    Err(e)
                }
            },
            other => {
                let err = not_ready(&other);
                self.state = other;
                Err(err)
            }
        }
    }
}

fn not_ready<S>(state: &State<S>) -> Error {
    match state {
        State::Failed(e) => e.clone(),
        State::Closed => Error::SourceClosed,
        other => Error::NotReady {
            state: other.kind(),
        },
    }
}

impl<S: ByteSource> PakReader<S> {
    fn from_state(state: State<S>) -> PakReader<S> {
        PakReader {
            state,
            decompressor: Box::new(StandardDecompressor),
            checksum: Box::new(Sha1Checksum),
            decryptor: None,
        }
    }

    /// A reader over an already-open source. Starts in the `Opened` state.
    pub fn with_source(source: S) -> PakReader<S> {
        PakReader::from_state(State::Opened(source))
    }

    pub fn with_decompressor<D: Decompressor + 'static>(mut self, decompressor: D) -> Self {
        self.decompressor = Box::new(decompressor);
        self
    }

    pub fn with_checksum<C: Checksum + 'static>(mut self, checksum: C) -> Self {
        self.checksum = Box::new(checksum);
        self
    }

    pub fn with_decryptor<D: Decryptor + 'static>(mut self, decryptor: D) -> Self {
        self.decryptor = Some(Box::new(decryptor));
        self
    }

    #[inline(always)]
    pub fn state(&self) -> ReaderState {
        self.state.kind()
    }

    /// Parse the footer and index. A failure is final: the source is released
    /// and the reader moves to `Failed`.
    pub fn load_index(&mut self) -> Result<()> {
        let source = match std::mem::replace(&mut self.state, State::Closed) {
            State::Opened(source) => source,
            other => {
                let err = not_ready(&other);
                self.state = other;
                return Err(err);
            }
        };

        let loaded = read_trailer(&source).and_then(|(footer, header)| {
            let index = read_index(&source, &footer, &*self.checksum)?;
            Ok((footer, header, index))
        });

        match loaded {
            Ok((footer, header, index)) => {
                self.state = State::IndexLoaded(Box::new(Loaded {
                    source,
                    header,
                    footer,
                    index,
                }));
                Ok(())
            }
            Err(e) => {
                let mut source = source;
                source.close();
                tracing::debug!(archive = source.label(), error = %e, "loading index failed");
                self.state = State::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn loaded(&self) -> Result<&Loaded<S>> {
        match &self.state {
            State::IndexLoaded(loaded) => Ok(&**loaded),
            other => Err(not_ready(other)),
        }
    }

    fn extractor<'a>(&'a self, loaded: &'a Loaded<S>) -> EntryExtractor<'a> {
        EntryExtractor::new(
            &loaded.source,
            &*self.decompressor,
            &*self.checksum,
            self.decryptor.as_deref(),
        )
    }

    pub fn header(&self) -> Result<Option<PakHeader>> {
        Ok(self.loaded()?.header)
    }

    pub fn footer(&self) -> Result<&PakFooter> {
        Ok(&self.loaded()?.footer)
    }

    pub fn index(&self) -> Result<&PakIndex> {
        Ok(&self.loaded()?.index)
    }

    /// All entries in index order.
    pub fn entries(&self) -> Result<&[EntryRecord]> {
        Ok(self.loaded()?.index.entries())
    }

    pub fn entry(&self, path: &str) -> Result<&EntryRecord> {
        self.loaded()?
            .index
            .get(path)
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }

    /// Decoded and verified contents of the entry at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let loaded = self.loaded()?;
        let record = self.entry(path)?;
        self.extractor(loaded).read(record, true)
    }

    /// Extract a single entry beneath `root`, returning the bytes written.
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: &str,
        root: P,
        opts: &ExtractOptions,
    ) -> Result<u64> {
        let loaded = self.loaded()?;
        if contains_traversal(path) {
            tracing::warn!(target: "security", path, "rejected extraction request");
            return Err(Error::PathTraversalRejected {
                path: path.to_string(),
            });
        }
        let record = self.entry(path)?;
        self.extractor(loaded).extract(record, root.as_ref(), opts)
    }

    pub fn extract_all<P: AsRef<Path>>(
        &self,
        root: P,
        opts: &ExtractOptions,
    ) -> Result<ExtractReport> {
        self.extract_matching(root, |_| true, opts)
    }

    /// Extract every entry `predicate` accepts.
    pub fn extract_matching<P, F>(
        &self,
        root: P,
        predicate: F,
        opts: &ExtractOptions,
    ) -> Result<ExtractReport>
    where
        P: AsRef<Path>,
        F: Fn(&EntryRecord) -> bool + Sync,
    {
        let loaded = self.loaded()?;
        let selected: Vec<&EntryRecord> =
            loaded.index.iter().filter(|record| predicate(*record)).collect();
        self.extractor(loaded)
            .extract_batch(&selected, root.as_ref(), opts)
    }

    /// Decode every entry and check its digest without writing anything.
    pub fn validate_all(&self) -> Result<ValidateStats> {
        self.validate_all_with_options(&ExtractOptions::default())
    }

    /// Like [`validate_all`](Self::validate_all), honouring `opts.jobs` and
    /// `opts.cancel`. Digests are verified regardless of `opts.verify`.
    pub fn validate_all_with_options(&self, opts: &ExtractOptions) -> Result<ValidateStats> {
        let loaded = self.loaded()?;
        let records: Vec<&EntryRecord> = loaded.index.iter().collect();
        Ok(self.extractor(loaded).validate_batch(&records, opts))
    }

    pub fn info(&self) -> Result<ArchiveInfo> {
        let loaded = self.loaded()?;
        let index = &loaded.index;

        Ok(ArchiveInfo {
            label: loaded.source.label().to_string(),
            file_size: loaded.source.size(),
            version: loaded.footer.version,
            has_header: loaded.header.is_some(),
            index_offset: loaded.footer.index_offset,
            index_size: loaded.footer.index_size,
            index_digest: loaded.footer.index_digest,
            checksum: self.checksum.name(),
            entry_count: index.len(),
            total_compressed: index.total_compressed(),
            total_uncompressed: index.total_uncompressed(),
            encrypted_entries: index.iter().filter(|e| e.encrypted).count(),
            overlap_groups: index.overlaps().len(),
            overlapping_entries: index.overlapping_entries(),
        })
    }

    /// Release the source. Valid in any state; calling it again does nothing.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Opened(mut source) => source.close(),
            State::IndexLoaded(mut loaded) => loaded.source.close(),
            State::Unopened(_) | State::Failed(_) | State::Closed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::header::MAGIC_BYTES;
    use crate::source::MemorySource;
    use byteorder::{LittleEndian, WriteBytesExt};

    /// A version 15 archive with no entries and no digests.
    fn empty_archive() -> Vec<u8> {
        let mut out = vec![];
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(4).unwrap();
        out.extend_from_slice(&[0u8; 20]);
        out.write_u32::<LittleEndian>(15).unwrap();
        out.extend_from_slice(MAGIC_BYTES);
        out
    }

    #[test]
    fn state_transitions() {
        let mut reader = PakReader::with_source(MemorySource::new(empty_archive()));
        assert_eq!(reader.state(), ReaderState::Opened);
        assert_eq!(reader.entries().unwrap_err().kind(), ErrorKind::NotReady);

        reader.load_index().unwrap();
        assert_eq!(reader.state(), ReaderState::IndexLoaded);
        assert!(reader.entries().unwrap().is_empty());
        assert_eq!(reader.load_index().unwrap_err().kind(), ErrorKind::NotReady);

        reader.close();
        reader.close();
        assert_eq!(reader.state(), ReaderState::Closed);
        assert_eq!(reader.entries().unwrap_err().kind(), ErrorKind::SourceClosed);
        assert_eq!(reader.info().unwrap_err().kind(), ErrorKind::SourceClosed);
    }

    #[test]
    fn failure_is_sticky() {
        let mut reader = PakReader::with_source(MemorySource::new(vec![0x11; 100]));
        let first = reader.load_index().unwrap_err();
        assert_eq!(first.kind(), ErrorKind::InvalidFormat);
        assert_eq!(reader.state(), ReaderState::Failed);

        for err in [
            reader.entries().unwrap_err(),
            reader.load_index().unwrap_err(),
            reader.read("x").unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        reader.close();
        assert_eq!(reader.state(), ReaderState::Closed);
    }

    #[test]
    fn unopened_reader() {
        let mut reader = PakReader::new("/no/such/archive.pak");
        assert_eq!(reader.state(), ReaderState::Unopened);
        assert_eq!(reader.load_index().unwrap_err().kind(), ErrorKind::NotReady);
        assert_eq!(reader.open().unwrap_err().kind(), ErrorKind::IoFailure);
        assert_eq!(reader.state(), ReaderState::Failed);
    }

    #[test]
    fn info_of_empty_archive() {
        let mut reader = PakReader::with_source(MemorySource::with_label(empty_archive(), "empty.pak"));
        reader.load_index().unwrap();
        let info = reader.info().unwrap();
        assert_eq!(info.label, "empty.pak");
        assert_eq!(info.version, 15);
        assert_eq!(info.entry_count, 0);
        assert_eq!(info.index_digest, None);
        assert_eq!(info.checksum, "sha1");
        assert!(!info.has_header);
    }
}
