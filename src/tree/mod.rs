//! Whole-tree hashing.
//!
//! This module turns a directory into one [`GlobalDigest`]:
//! - [`dispatch`]: walks the tree and hashes every file on a worker pool,
//!   going through the cache
//! - [`aggregate`]: folds the per-file digests into the global digest
//!
//! # Example
//!
//! ```no_run
//! use treetrawl::cache::{CacheMode, CacheStore};
//! use treetrawl::tree::{TrawlConfig, TreeHasher};
//! use std::path::Path;
//!
//! let store = CacheStore::new("/tmp/treetrawl-cache", CacheMode::ReadWrite);
//! let hasher = TreeHasher::new(store, TrawlConfig::default().with_workers(4));
//! let (digest, summary) = hasher.hash_tree(Path::new(".")).unwrap();
//! println!("{digest} ({} files, {} cached)", summary.files, summary.cache_hits);
//! ```

pub mod aggregate;
pub mod dispatch;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{reclaim, CacheMode, CacheStore};
use crate::progress::ProgressCallback;
use crate::scanner::{HashError, DEFAULT_CHUNK_SIZE};

pub use aggregate::{combine, GlobalDigest};
pub use dispatch::{resolve_root, FileOutcome, TreeHasher};

/// What to do when a single file cannot be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Warn and leave the file out of the global digest.
    #[default]
    Skip,
    /// Abort the whole run.
    Fail,
}

/// Configuration for a trawl.
#[derive(Clone)]
pub struct TrawlConfig {
    /// Number of hashing workers.
    pub workers: usize,
    /// Read chunk size in bytes; bounds memory per worker.
    pub chunk_size: usize,
    /// Policy for files that fail to hash.
    pub error_policy: ErrorPolicy,
    /// Descend into symlinked directories.
    pub follow_symlinks: bool,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for TrawlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrawlConfig")
            .field("workers", &self.workers)
            .field("chunk_size", &self.chunk_size)
            .field("error_policy", &self.error_policy)
            .field("follow_symlinks", &self.follow_symlinks)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for TrawlConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_policy: ErrorPolicy::default(),
            follow_symlinks: false,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl TrawlConfig {
    /// Set the worker count (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the read chunk size in bytes (at least one).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the per-file error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set whether symlinked directories are descended into.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Number of available processing units, at least one.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Statistics from one trawl.
#[derive(Debug, Default)]
pub struct TrawlSummary {
    /// Regular files found by the walk
    pub files: usize,
    /// Files whose cached digest was reused
    pub cache_hits: usize,
    /// Files whose content was read and hashed
    pub hashed: usize,
    /// Files that could not be hashed
    pub failed: usize,
    /// Errors for the failed files, in walk order
    pub errors: Vec<HashError>,
    /// Fresh digests that could not be written to the cache
    pub cache_write_failures: usize,
    /// Entries the walk could not read (unreadable directories etc.)
    pub walk_errors: usize,
    /// Whether the run was cut short by a shutdown request
    pub interrupted: bool,
}

impl TrawlSummary {
    /// Number of files that contributed to the digest.
    #[must_use]
    pub fn contributing(&self) -> usize {
        self.cache_hits + self.hashed
    }
}

/// Errors that end a trawl.
#[derive(Debug, thiserror::Error)]
pub enum TrawlError {
    /// The target directory does not exist.
    #[error("Directory not found: {0}")]
    NotFound(PathBuf),

    /// The target exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The target could not be resolved or inspected.
    #[error("Cannot access {path}: {source}")]
    Access {
        /// Path that was being resolved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A file failed under [`ErrorPolicy::Fail`].
    #[error("Failed to hash file: {0}")]
    FileFailed(#[source] HashError),

    /// The worker pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The run was interrupted before every file was hashed.
    #[error("Interrupted")]
    Interrupted,
}

impl TrawlError {
    /// Whether the error is about the caller's input rather than the run.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotADirectory(_))
    }
}

/// Reclaim orphans under `directory`, then hash it.
///
/// This is the whole core in one call: caching on or off, a worker count,
/// and one digest back.
///
/// # Errors
///
/// See [`TreeHasher::hash_tree`].
pub fn hash_directory(
    directory: &Path,
    cache_root: &Path,
    caching_enabled: bool,
    workers: usize,
) -> Result<GlobalDigest, TrawlError> {
    let mode = if caching_enabled {
        CacheMode::ReadWrite
    } else {
        CacheMode::Disabled
    };
    let root = resolve_root(directory)?;
    let store = CacheStore::new(cache_root, mode);
    reclaim(&store, &root);

    let hasher = TreeHasher::new(store, TrawlConfig::default().with_workers(workers));
    hasher.hash_tree(&root).map(|(digest, _)| digest)
}
