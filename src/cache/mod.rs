//! Hash caching module for treetrawl.
//!
//! This module persists one small JSON record per hashed file so that
//! unchanged files are not re-read on the next run.
//!
//! # Architecture
//!
//! * [`store`]: maps source paths to record locations under a cache root
//!   (and back), reads and atomically writes records.
//! * [`entry`]: the record model and the [`Mtime`] it is keyed on.
//! * [`reclaim`]: deletes records whose source file has disappeared.
//!
//! # Cache Invalidation
//!
//! A record is valid only while its stored modification time equals the
//! live file's modification time, to the nanosecond. Any mismatch, or a
//! record that cannot be parsed, is treated as a miss and overwritten.

pub mod entry;
pub mod reclaim;
pub mod store;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub use entry::{FileDigestRecord, Mtime};
pub use reclaim::{reclaim, ReclaimStats};
pub use store::{CacheStore, CACHE_SUFFIX};

/// How the store may use the cache on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Reuse fresh records, write new ones.
    #[default]
    ReadWrite,
    /// Ignore existing records, recompute every file and overwrite.
    Refresh,
    /// Neither read nor write records.
    Disabled,
}

impl CacheMode {
    /// Whether records are read.
    #[must_use]
    pub fn reads(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Whether records are written.
    #[must_use]
    pub fn writes(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Errors from writing cache records.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error on a cache path.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The record could not be encoded.
    #[error("Failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The location has no parent directory.
    #[error("Invalid cache location: {0}")]
    InvalidLocation(PathBuf),
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Default platform-specific cache root (e.g. `~/.cache/treetrawl`).
///
/// Returns `None` when no home directory can be determined.
#[must_use]
pub fn default_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treetrawl").map(|dirs| dirs.cache_dir().to_path_buf())
}
