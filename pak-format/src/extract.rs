//! Turning index entries into files on disk.

use std::fs;
use std::io::Write;
use std::ops::AddAssign;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::checksum::Checksum;
use crate::compression::{CodecError, Compression, Decompressor};
use crate::error::{Error, Result};
use crate::record::EntryRecord;
use crate::source::ByteSource;

/// Decryption service for encrypted entries. Key handling is up to the implementor.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, record: &EntryRecord, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Shared flag for stopping a batch. Entries already in flight finish; the
/// rest report [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// Check entry digests against the decompressed payload.
    pub verify: bool,
    /// Worker threads for batch extraction. `None` uses the global rayon pool,
    /// `Some(1)` runs inline.
    pub jobs: Option<usize>,
    pub cancel: CancelToken,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            verify: true,
            jobs: None,
            cancel: CancelToken::default(),
        }
    }
}

/// Outcome for one entry of a batch.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub path: String,
    /// Bytes written on success.
    pub outcome: Result<u64>,
}

impl ExtractionResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Statistics from extracting files from an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files_extracted: u64,
    /// Total bytes written to disk.
    pub bytes_written: u64,
    /// Entries that failed for any reason, integrity failures included.
    pub failures: u64,
    pub integrity_failures: u64,
    /// Entries never started because the batch was cancelled.
    pub cancelled: u64,
}

impl ExtractStats {
    fn record(&mut self, outcome: &Result<u64>) {
        match outcome {
            Ok(bytes) => {
                self.files_extracted += 1;
                self.bytes_written += bytes;
            }
            Err(Error::Cancelled { .. }) => self.cancelled += 1,
            Err(Error::IntegrityMismatch { .. }) => {
                self.integrity_failures += 1;
                self.failures += 1;
            }
            Err(_) => self.failures += 1,
        }
    }
}

impl AddAssign for ExtractStats {
    fn add_assign(&mut self, other: Self) {
        self.files_extracted += other.files_extracted;
        self.bytes_written += other.bytes_written;
        self.failures += other.failures;
        self.integrity_failures += other.integrity_failures;
        self.cancelled += other.cancelled;
    }
}

/// Per-entry results, in index order, plus totals.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub results: Vec<ExtractionResult>,
    pub stats: ExtractStats,
}

impl ExtractReport {
    pub fn is_success(&self) -> bool {
        self.stats.failures == 0 && self.stats.cancelled == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }
}

/// Statistics from validating entries without extracting them.
#[derive(Debug, Clone, Default)]
pub struct ValidateStats {
    pub files_checked: u64,
    /// Entries with no digest recorded; they are still decoded.
    pub files_without_checksum: u64,
    pub checksum_failures: u64,
    /// Entries skipped because the run was cancelled.
    pub cancelled: u64,
    /// Every entry that failed, in index order. Cancelled entries are not listed.
    pub failures: Vec<ExtractionResult>,
}

/// Selects entries whose path starts with any of a set of prefixes.
///
/// Matching is per path component. An empty set matches everything.
#[derive(Debug, Clone, Default)]
pub struct PathPrefixes(Vec<String>);

impl PathPrefixes {
    pub fn new<I, S>(prefixes: I) -> PathPrefixes
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathPrefixes(prefixes.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, record: &EntryRecord) -> bool {
        self.0.is_empty() || self.0.iter().any(|p| record.path.starts_with(p))
    }
}

/// Reads, decodes, checks and writes single entries.
pub struct EntryExtractor<'a> {
    pub(crate) source: &'a dyn ByteSource,
    pub(crate) decompressor: &'a dyn Decompressor,
    pub(crate) checksum: &'a dyn Checksum,
    pub(crate) decryptor: Option<&'a dyn Decryptor>,
}

impl<'a> EntryExtractor<'a> {
    pub fn new(
        source: &'a dyn ByteSource,
        decompressor: &'a dyn Decompressor,
        checksum: &'a dyn Checksum,
        decryptor: Option<&'a dyn Decryptor>,
    ) -> EntryExtractor<'a> {
        EntryExtractor {
            source,
            decompressor,
            checksum,
            decryptor,
        }
    }

    /// Return the decoded payload of `record`.
    pub fn read(&self, record: &EntryRecord, verify: bool) -> Result<Vec<u8>> {
        let path = record.path.as_str();
        let offset = record.data_offset;

        let len = usize::try_from(record.compressed_size).map_err(|_| {
            Error::corrupt(
                self.source.label(),
                offset,
                format!("entry '{}' is too large to address", path),
            )
        })?;
        let mut data = self.source.read_at(offset, len)?;

        if record.encrypted {
            let decryptor = self.decryptor.ok_or_else(|| Error::EncryptedEntry {
                path: path.to_string(),
            })?;
            data = decryptor
                .decrypt(record, &data)
                .map_err(|e| Error::DecryptionFailed {
                    path: path.to_string(),
                    offset,
                    source: Arc::new(e),
                })?;
        }

        let payload = match record.compression {
            Compression::Stored => {
                if data.len() as u64 != record.uncompressed_size {
                    return Err(Error::DecompressionFailed {
                        path: path.to_string(),
                        offset,
                        source: CodecError::LengthMismatch {
                            expected: record.uncompressed_size,
                            actual: data.len() as u64,
                        },
                    });
                }
                data
            }
            method => self
                .decompressor
                .decompress(method, &data, record.uncompressed_size)
                .map_err(|e| match e {
                    CodecError::Unsupported(method) => Error::UnsupportedMethod {
                        path: path.to_string(),
                        method: method.id(),
                    },
                    source => Error::DecompressionFailed {
                        path: path.to_string(),
                        offset,
                        source,
                    },
                })?,
        };

        if verify {
            if let Some(expected) = record.digest {
                let actual = self.checksum.digest(&payload);
                if actual != expected {
                    tracing::warn!(
                        "Checksum mismatch for {}: expected {}, got {}",
                        path,
                        expected,
                        actual
                    );
                    return Err(Error::IntegrityMismatch {
                        path: path.to_string(),
                        expected,
                        actual,
                    });
                }
            }
        }

        Ok(payload)
    }

    /// Write `record` beneath `root`, returning the number of bytes written.
    ///
    /// The file appears at its final path only once fully written and verified.
    pub fn extract(&self, record: &EntryRecord, root: &Path, opts: &ExtractOptions) -> Result<u64> {
        let dest = record.path.to_fs_path(root);

        if !opts.overwrite && dest.symlink_metadata().is_ok() {
            return Err(Error::AlreadyExists { path: dest });
        }

        let payload = self.read(record, opts.verify)?;

        let parent = dest.parent().unwrap_or(root);
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
        tmp.write_all(&payload)
            .and_then(|_| tmp.flush())
            .map_err(|e| Error::io(tmp.path(), e))?;

        if opts.overwrite {
            tmp.persist(&dest).map_err(|e| Error::io(&dest, e.error))?;
        } else {
            tmp.persist_noclobber(&dest).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::AlreadyExists { path: dest.clone() }
                } else {
                    Error::io(&dest, e.error)
                }
            })?;
        }

        tracing::debug!(
            path = %record.path,
            offset = format_args!("{:#x}", record.data_offset),
            bytes = payload.len(),
            "extracted entry"
        );

        Ok(payload.len() as u64)
    }

    /// Extract every record in `records`, isolating per-entry failures.
    ///
    /// Fails as a whole only if `root` cannot be created, or disappears
    /// part-way through. In the second case the remaining entries are never
    /// started and the per-entry results are dropped; files already written
    /// stay on disk and their count is logged.
    pub fn extract_batch(
        &self,
        records: &[&EntryRecord],
        root: &Path,
        opts: &ExtractOptions,
    ) -> Result<ExtractReport> {
        let _span = tracing::info_span!(
            "extract",
            archive = self.source.label(),
            entries = records.len()
        )
        .entered();

        fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;

        let root_lost = AtomicBool::new(false);
        let run_one = |record: &EntryRecord| {
            let path = record.path.to_string();
            if opts.cancel.is_cancelled() || root_lost.load(Ordering::SeqCst) {
                return ExtractionResult {
                    outcome: Err(Error::Cancelled { path: path.clone() }),
                    path,
                };
            }

            let outcome = self.extract(record, root, opts);
            if let Err(Error::Io { .. }) = &outcome {
                if !root.is_dir() {
                    root_lost.store(true, Ordering::SeqCst);
                }
            }
            ExtractionResult { path, outcome }
        };

        let results = run_on_pool(opts.jobs, records, run_one);

        if root_lost.load(Ordering::SeqCst) {
            tracing::warn!(
                root = %root.display(),
                written = results.iter().filter(|r| r.is_ok()).count(),
                "output directory disappeared, batch abandoned"
            );
            return Err(Error::io(
                root,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "output directory disappeared during extraction",
                ),
            ));
        }

        let mut stats = ExtractStats::default();
        for result in &results {
            stats.record(&result.outcome);
        }

        tracing::info!(
            files = stats.files_extracted,
            bytes = stats.bytes_written,
            failures = stats.failures,
            cancelled = stats.cancelled,
            "extraction finished"
        );

        Ok(ExtractReport { results, stats })
    }

    /// Decode and check every record without writing anything.
    ///
    /// Digests are always verified. Only `jobs` and `cancel` are taken from
    /// `opts`.
    pub fn validate_batch(&self, records: &[&EntryRecord], opts: &ExtractOptions) -> ValidateStats {
        let results = run_on_pool(opts.jobs, records, |record| {
            let path = record.path.to_string();
            let outcome = if opts.cancel.is_cancelled() {
                Err(Error::Cancelled { path: path.clone() })
            } else {
                self.read(record, true).map(|data| data.len() as u64)
            };
            ExtractionResult { path, outcome }
        });

        let mut stats = ValidateStats::default();
        for (record, result) in records.iter().zip(results) {
            if let Err(Error::Cancelled { .. }) = result.outcome {
                stats.cancelled += 1;
                continue;
            }
            stats.files_checked += 1;
            if record.digest.is_none() {
                stats.files_without_checksum += 1;
            }
            if let Err(e) = &result.outcome {
                if matches!(e, Error::IntegrityMismatch { .. }) {
                    stats.checksum_failures += 1;
                }
                stats.failures.push(result);
            }
        }
        stats
    }
}

/// Map `f` over `records`, keeping their order. `Some(1)` runs inline,
/// `Some(n)` on a dedicated pool of `n` threads, anything else on the global pool.
fn run_on_pool<T, F>(jobs: Option<usize>, records: &[&EntryRecord], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&EntryRecord) -> T + Sync,
{
    match jobs {
        Some(1) => records.iter().map(|r| f(*r)).collect(),
        Some(n) if n > 1 => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(|| records.par_iter().map(|r| f(*r)).collect()),
            Err(e) => {
                tracing::warn!(jobs = n, error = %e, "could not build worker pool, using the global pool");
                records.par_iter().map(|r| f(*r)).collect()
            }
        },
        _ => records.par_iter().map(|r| f(*r)).collect(),
    }
}
