//! Cache-backed parallel hashing of every file in a tree.
//!
//! # Overview
//!
//! [`TreeHasher`] walks a directory, then hands each file to a dedicated
//! rayon pool. Every file is one task, so no two workers ever read or write
//! the same cache record and the store needs no locking. Per file:
//!
//! 1. stat the file for its current mtime
//! 2. look up its record and validate it against that mtime
//! 3. on a hit reuse the digest, otherwise hash the content and store a
//!    fresh record (best effort)
//!
//! Results come back in no particular order; [`combine`] sorts them.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::{combine, ErrorPolicy, GlobalDigest, TrawlConfig, TrawlError, TrawlSummary};
use crate::cache::{CacheStore, FileDigestRecord, Mtime, CACHE_SUFFIX};
use crate::progress::{PHASE_HASH, PHASE_WALK};
use crate::scanner::path_utils::absolute_path;
use crate::scanner::{FileEntry, HashError, Hasher, Walker, WalkerConfig};

/// Result of hashing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// A fresh cached record was reused.
    Cached(String),
    /// The content was hashed.
    Computed {
        /// The new file digest
        digest: String,
        /// Whether writing the new record failed
        write_failed: bool,
    },
}

impl FileOutcome {
    /// The file digest, however it was obtained.
    #[must_use]
    pub fn digest(&self) -> &str {
        match self {
            Self::Cached(digest) | Self::Computed { digest, .. } => digest,
        }
    }
}

/// Hashes directory trees through a [`CacheStore`].
#[derive(Debug)]
pub struct TreeHasher {
    store: CacheStore,
    hasher: Hasher,
    config: TrawlConfig,
}

impl TreeHasher {
    /// Create a tree hasher writing through `store`.
    #[must_use]
    pub fn new(store: CacheStore, config: TrawlConfig) -> Self {
        let mut hasher = Hasher::with_chunk_size(config.chunk_size);
        if let Some(flag) = &config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(flag.clone());
        }
        Self {
            store,
            hasher,
            config,
        }
    }

    /// The cache store in use.
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Digest of one file, from the cache when its record is fresh.
    ///
    /// `path` must be absolute and normalized, as yielded by the walker.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be statted or read. Cache
    /// problems are never errors: bad records are misses and failed writes
    /// are reported through [`FileOutcome::Computed::write_failed`].
    pub fn digest_file(&self, path: &Path) -> Result<FileOutcome, HashError> {
        let metadata = fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
        let mtime = Mtime::of(&metadata);
        let location = self.store.location_for(path);

        if let Some(record) = self.store.lookup(&location) {
            if CacheStore::validate(&record, mtime) {
                log::trace!("Cache hit: {}", path.display());
                return Ok(FileOutcome::Cached(record.digest));
            }
            log::trace!("Stale cache record: {}", path.display());
        }

        let digest = self.hasher.file_digest(path, mtime)?;
        let record = FileDigestRecord::new(path.to_path_buf(), digest, mtime);

        let write_failed = match self.store.store(&location, &record) {
            Ok(()) => false,
            Err(e) => {
                log::warn!("Failed to update cache for {}: {}", path.display(), e);
                true
            }
        };

        Ok(FileOutcome::Computed {
            digest: record.digest,
            write_failed,
        })
    }

    /// Digest every file under `directory`.
    ///
    /// The returned digests are in no meaningful order.
    ///
    /// # Errors
    ///
    /// Fails if `directory` is missing or not a directory, if the worker
    /// pool cannot start, if the run is interrupted, or if a file fails
    /// under [`ErrorPolicy::Fail`].
    pub fn digest_files(&self, directory: &Path) -> Result<(Vec<String>, TrawlSummary), TrawlError> {
        let root = resolve_root(directory)?;
        let mut summary = TrawlSummary::default();

        let files = self.collect_files(&root, &mut summary);
        if self.config.is_shutdown_requested() {
            return Err(TrawlError::Interrupted);
        }
        summary.files = files.len();

        if files.is_empty() {
            log::debug!("No files under {}", root.display());
            return Ok((Vec::new(), summary));
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_HASH, files.len());
        }
        log::info!(
            "Hashing {} files under {} with {} workers",
            files.len(),
            root.display(),
            self.config.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("treetrawl-worker-{i}"))
            .build()?;

        let results: Vec<(PathBuf, Option<Result<FileOutcome, HashError>>)> = pool.install(|| {
            files
                .into_par_iter()
                .map(|file| {
                    if self.config.is_shutdown_requested() {
                        return (file.path, None);
                    }
                    let result = self.digest_file(&file.path);
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(file.path.to_string_lossy().as_ref());
                    }
                    (file.path, Some(result))
                })
                .collect()
        });

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_HASH);
        }

        let mut digests = Vec::with_capacity(results.len());
        let mut first_failure = None;
        for (path, result) in results {
            match result {
                None | Some(Err(HashError::Interrupted(_))) => summary.interrupted = true,
                Some(Ok(FileOutcome::Cached(digest))) => {
                    summary.cache_hits += 1;
                    digests.push(digest);
                }
                Some(Ok(FileOutcome::Computed {
                    digest,
                    write_failed,
                })) => {
                    summary.hashed += 1;
                    if write_failed {
                        summary.cache_write_failures += 1;
                    }
                    digests.push(digest);
                }
                Some(Err(e)) => {
                    summary.failed += 1;
                    match self.config.error_policy {
                        ErrorPolicy::Skip => {
                            log::warn!("Skipping {}: {}", path.display(), e);
                            summary.errors.push(e);
                        }
                        ErrorPolicy::Fail => {
                            if first_failure.is_none() {
                                first_failure = Some(e);
                            } else {
                                summary.errors.push(e);
                            }
                        }
                    }
                }
            }
        }

        if summary.interrupted || self.config.is_shutdown_requested() {
            log::info!("Hashing interrupted by shutdown signal");
            return Err(TrawlError::Interrupted);
        }
        if let Some(e) = first_failure {
            return Err(TrawlError::FileFailed(e));
        }

        log::info!(
            "Hashed {} files ({} from cache, {} computed, {} skipped)",
            summary.files,
            summary.cache_hits,
            summary.hashed,
            summary.failed
        );
        Ok((digests, summary))
    }

    /// Digest of the whole tree under `directory`.
    ///
    /// # Errors
    ///
    /// Same as [`TreeHasher::digest_files`].
    pub fn hash_tree(&self, directory: &Path) -> Result<(GlobalDigest, TrawlSummary), TrawlError> {
        let (digests, summary) = self.digest_files(directory)?;
        Ok((combine(digests), summary))
    }

    fn collect_files(&self, root: &Path, summary: &mut TrawlSummary) -> Vec<FileEntry> {
        let walker_config = WalkerConfig::excluding_cache(self.store.root(), CACHE_SUFFIX)
            .with_follow_symlinks(self.config.follow_symlinks);
        let mut walker = Walker::new(root, walker_config);
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_WALK, 0);
        }

        let mut files = Vec::new();
        for entry in walker.walk() {
            match entry {
                Ok(file) => {
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(file.path.to_string_lossy().as_ref());
                    }
                    files.push(file);
                }
                // Already logged by the walker
                Err(_) => summary.walk_errors += 1,
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_WALK);
        }
        files
    }
}

/// Absolute form of `directory`, checked to be an existing directory.
///
/// # Errors
///
/// [`TrawlError::NotFound`] or [`TrawlError::NotADirectory`] for bad input,
/// [`TrawlError::Access`] when the path cannot be inspected at all.
pub fn resolve_root(directory: &Path) -> Result<PathBuf, TrawlError> {
    let root = absolute_path(directory).map_err(|source| TrawlError::Access {
        path: directory.to_path_buf(),
        source,
    })?;
    match fs::metadata(&root) {
        Ok(metadata) if metadata.is_dir() => Ok(root),
        Ok(_) => Err(TrawlError::NotADirectory(directory.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TrawlError::NotFound(directory.to_path_buf()))
        }
        Err(source) => Err(TrawlError::Access {
            path: directory.to_path_buf(),
            source,
        }),
    }
}
