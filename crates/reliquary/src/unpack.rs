//! Archive extraction.
//!
//! An [`Unpacker`] walks the buckets of each archive index in order, resolves
//! every file hash to an output path, reads the payload from the data file and
//! hands it to a bounded write queue. Files that already exist are skipped, so
//! a repeated run only fills in what is missing.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use reliquary_bhd::bhd5::Bhd5Reader;
use reliquary_bhd::{crypto, sniff, ArchiveKey, Bucket, FileHeader, IndexReader, IndexVersion};
use reliquary_common::HashDictionary;

use crate::context::Context;
use crate::keys::KeyStore;
use crate::profile::GameProfile;
use crate::writer::WriteQueue;
use crate::{Error, Result};

/// Default ceiling on bytes held by outstanding writes (100 MiB).
pub const DEFAULT_WRITE_LIMIT: u64 = 100 * 1024 * 1024;

/// Default wait between polls while the write budget is exhausted.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// Directory under the game directory that receives unresolved files.
pub const UNKNOWN_DIR: &str = "_unknown";

/// Tuning knobs for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Ceiling on bytes held by outstanding writes.
    pub write_limit: u64,
    /// Writer pool size; `0` lets the pool decide.
    pub writer_threads: usize,
    /// Wait between polls while over budget.
    pub backoff: Duration,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            write_limit: DEFAULT_WRITE_LIMIT,
            writer_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Counters for one archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Headers in the index.
    pub files: usize,
    /// Files written by this run.
    pub written: usize,
    /// Files skipped because they already exist.
    pub skipped: usize,
    /// Written files with no dictionary entry.
    pub unknown: usize,
    /// Highest number of bytes held by outstanding writes.
    pub peak_in_flight: u64,
}

/// Result of unpacking one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Every header was processed.
    Unpacked(ArchiveStats),
    /// The index or data file does not exist; nothing was done.
    Missing,
    /// Cancellation was requested; work issued before that has finished.
    Cancelled(ArchiveStats),
}

/// Result of unpacking a whole title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackOutcome {
    /// Every archive was processed, in profile order.
    Completed(Vec<(String, ArchiveOutcome)>),
    /// Cancellation was requested before all archives were processed.
    Cancelled,
}

/// One archive to extract.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveJob<'a> {
    pub game_dir: &'a Path,
    /// Base name; `<game_dir>/<archive>.bhd` and `.bdt` are opened.
    pub archive: &'a str,
    pub key: &'a ArchiveKey,
    pub version: IndexVersion,
    pub dictionary: &'a HashDictionary,
    /// Position of this archive in the title, for progress.
    pub index: usize,
    /// Number of archives in the title, for progress.
    pub total: usize,
}

/// A whole title to extract.
#[derive(Clone, Copy)]
pub struct UnpackSession<'a> {
    pub game_dir: &'a Path,
    pub profile: &'a GameProfile,
    pub dictionary: &'a HashDictionary,
    pub keys: &'a dyn KeyStore,
}

/// Drives archive extraction through an injected index reader.
#[derive(Clone)]
pub struct Unpacker {
    reader: Arc<dyn IndexReader>,
    options: UnpackOptions,
}

impl Unpacker {
    pub fn new(reader: Arc<dyn IndexReader>) -> Self {
        Self::with_options(reader, UnpackOptions::default())
    }

    pub fn with_options(reader: Arc<dyn IndexReader>, options: UnpackOptions) -> Self {
        Self { reader, options }
    }

    /// An unpacker for BHD5 indices with default options.
    pub fn bhd5() -> Self {
        Self::new(Arc::new(Bhd5Reader))
    }

    pub fn options(&self) -> &UnpackOptions {
        &self.options
    }

    /// Unpack every archive of a title, in profile order.
    ///
    /// Keys for all archives are resolved before any extraction starts. The
    /// first archive error stops the run.
    pub fn unpack(&self, ctx: &Context, session: &UnpackSession<'_>) -> Result<UnpackOutcome> {
        ctx.begin("Preparing to unpack...");
        let profile = session.profile;

        let keys = profile
            .archives
            .iter()
            .map(|archive| session.keys.key(archive))
            .collect::<Result<Vec<_>>>()?;

        if ctx.is_cancelled() {
            return Ok(UnpackOutcome::Cancelled);
        }

        tracing::info!(
            game_dir = %session.game_dir.display(),
            archives = profile.archives.len(),
            version = %profile.index_version,
            "unpacking title"
        );

        let mut outcomes = Vec::with_capacity(profile.archives.len());
        for (index, (archive, key)) in profile.archives.iter().zip(&keys).enumerate() {
            if ctx.is_cancelled() {
                return Ok(UnpackOutcome::Cancelled);
            }

            let job = ArchiveJob {
                game_dir: session.game_dir,
                archive,
                key,
                version: profile.index_version,
                dictionary: session.dictionary,
                index,
                total: profile.archives.len(),
            };

            let outcome = self.unpack_archive(ctx, &job)?;
            if let ArchiveOutcome::Cancelled(_) = outcome {
                return Ok(UnpackOutcome::Cancelled);
            }
            outcomes.push((archive.clone(), outcome));
        }

        ctx.report(1.0, "Unpacking complete!");
        tracing::info!("unpacking complete");
        Ok(UnpackOutcome::Completed(outcomes))
    }

    /// Unpack one archive.
    ///
    /// Every write dispatched before a failure or cancellation is awaited
    /// before this returns. Once cancellation is observed the outcome is
    /// [`ArchiveOutcome::Cancelled`] even if an error occurred.
    pub fn unpack_archive(&self, ctx: &Context, job: &ArchiveJob<'_>) -> Result<ArchiveOutcome> {
        let archive = job.archive;
        let progress_total = job.total as f64 + 2.0;
        ctx.report((job.index as f64 + 2.0) / progress_total, &format!("Loading {archive}..."));

        let bhd_path = job.game_dir.join(format!("{archive}.bhd"));
        let bdt_path = job.game_dir.join(format!("{archive}.bdt"));
        if !bhd_path.is_file() || !bdt_path.is_file() {
            tracing::warn!(archive, "index or data file missing, skipping archive");
            return Ok(ArchiveOutcome::Missing);
        }

        let buckets = self.read_index(&bhd_path, job)?;
        let mut bdt = File::open(&bdt_path).map_err(|source| Error::OpenData {
            path: bdt_path.clone(),
            source,
        })?;

        let mut stats = ArchiveStats {
            files: buckets.iter().map(Vec::len).sum(),
            ..ArchiveStats::default()
        };
        tracing::info!(archive, files = stats.files, "unpacking archive");

        let mut queue = WriteQueue::new(
            self.options.write_limit,
            self.options.writer_threads,
            self.options.backoff,
        )?;

        let extracted = extract(ctx, job, &buckets, &mut bdt, &mut queue, &mut stats);
        let drained = queue.finish();
        stats.written = queue.written();
        stats.peak_in_flight = queue.peak();

        if ctx.is_cancelled() {
            tracing::info!(archive, written = stats.written, "unpacking cancelled");
            return Ok(ArchiveOutcome::Cancelled(stats));
        }
        extracted?;
        drained?;

        tracing::info!(
            archive,
            written = stats.written,
            skipped = stats.skipped,
            unknown = stats.unknown,
            "archive unpacked"
        );
        Ok(ArchiveOutcome::Unpacked(stats))
    }

    fn read_index(&self, bhd_path: &Path, job: &ArchiveJob<'_>) -> Result<Vec<Bucket>> {
        let open_error = |source| Error::OpenIndex {
            path: bhd_path.to_path_buf(),
            source,
        };

        let mut file = File::open(bhd_path).map_err(open_error)?;
        let mut probe = Vec::with_capacity(4);
        (&mut file)
            .take(4)
            .read_to_end(&mut probe)
            .map_err(open_error)?;
        file.seek(SeekFrom::Start(0)).map_err(open_error)?;

        let buckets = if crypto::is_encrypted(&probe) {
            tracing::debug!(archive = job.archive, "decrypting index");
            let mut plain = crypto::decrypt_index(BufReader::new(file), job.key).map_err(|source| {
                Error::DecryptIndex {
                    path: bhd_path.to_path_buf(),
                    source,
                }
            })?;
            self.reader.read_index(&mut plain, job.version)
        } else {
            self.reader.read_index(&mut BufReader::new(file), job.version)
        };

        buckets.map_err(open_error)
    }
}

/// Where a header's payload goes.
struct Target {
    path: PathBuf,
    unknown: bool,
}

fn extract(
    ctx: &Context,
    job: &ArchiveJob<'_>,
    buckets: &[Bucket],
    bdt: &mut File,
    queue: &mut WriteQueue,
    stats: &mut ArchiveStats,
) -> Result<()> {
    let archive = job.archive;
    let unknown_dir = job.game_dir.join(UNKNOWN_DIR);
    let mut existing_unknown = UnknownFiles::default();
    let progress_total = job.total as f64 + 2.0;
    let file_count = stats.files.max(1) as f64;

    let mut current = 0usize;
    for bucket in buckets {
        if ctx.is_cancelled() {
            return Ok(());
        }

        for header in bucket {
            if ctx.is_cancelled() {
                return Ok(());
            }
            let index = current;
            current += 1;

            let hash = header.name_hash();
            let target = match job.dictionary.get(hash) {
                Some(name) => {
                    let path = resolve_named(job.game_dir, name);
                    if path.exists() {
                        stats.skipped += 1;
                        continue;
                    }
                    Target {
                        path,
                        unknown: false,
                    }
                }
                None => {
                    let path = unknown_dir.join(unknown_name(archive, hash));
                    if existing_unknown.contains(&path) {
                        stats.skipped += 1;
                        continue;
                    }
                    Target {
                        path,
                        unknown: true,
                    }
                }
            };

            ctx.report(
                (job.index as f64 + 2.0 + index as f64 / file_count) / progress_total,
                &format!("Unpacking {archive} ({}/{})...", index + 1, stats.files),
            );

            queue.admit(header.padded_file_size())?;

            let bytes = FileHeader::read(header.as_ref(), bdt).map_err(|source| Error::ReadFile {
                path: target.path.clone(),
                source,
            })?;

            let mut path = target.path;
            if target.unknown {
                stats.unknown += 1;
                if let Some(ext) = sniff::sniff(&bytes) {
                    let mut named = path.into_os_string();
                    named.push(format!(".{ext}"));
                    path = PathBuf::from(named);
                }
            }
            tracing::debug!(path = %path.display(), size = bytes.len(), "extracting");

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| Error::WriteFile {
                    path: path.clone(),
                    source,
                })?;
            }
            queue.dispatch(path, bytes);
        }
    }

    Ok(())
}

/// File name for a payload with no dictionary entry, without extension.
pub fn unknown_name(archive: &str, hash: reliquary_common::PathHash) -> String {
    format!("{archive}_{hash}")
}

/// Output path for a dictionary entry such as `/chr/c0000.anibnd.dcx`.
pub fn resolve_named(game_dir: &Path, name: &str) -> PathBuf {
    let mut path = game_dir.to_path_buf();
    path.extend(name.split(['/', '\\']).filter(|part| !part.is_empty()));
    path
}

/// Unknown-file names already on disk, scanned once per output directory.
///
/// An archive name such as `sd/sd` puts its unknown files in a subdirectory
/// of `_unknown`, so the directory that holds each name is scanned on demand.
#[derive(Default)]
struct UnknownFiles {
    dirs: FxHashMap<PathBuf, FxHashSet<String>>,
}

impl UnknownFiles {
    fn contains(&mut self, path: &Path) -> bool {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
        else {
            return false;
        };
        self.dirs
            .entry(dir.to_path_buf())
            .or_insert_with(|| scan_unknown(dir))
            .contains(name)
    }
}

/// Names already present in an unknown-file directory, plus every prefix
/// ending before a `.`, so `Data1_0000000042.dds` also claims
/// `Data1_0000000042`.
fn scan_unknown(dir: &Path) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return names;
    };

    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        for (dot, _) in name.match_indices('.') {
            names.insert(name[..dot].to_string());
        }
        names.insert(name);
    }

    names
}
