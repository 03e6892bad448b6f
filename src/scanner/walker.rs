//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for enumerating every regular
//! file below a root directory. Children are visited in file-name order so
//! that the walk itself is reproducible, although nothing downstream relies
//! on that order.
//!
//! # Features
//!
//! - Cache artifacts (by file-name suffix) are never yielded
//! - The cache root subtree is pruned, even if it lives inside the root
//! - Symlinked files are yielded under the link path; symlinked
//!   directories are only descended into when following is enabled
//! - Dangling symlinks are yielded so that hashing reports them per file
//! - Per-entry errors are yielded, iteration continues
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use treetrawl::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::excluding_cache(Path::new("/home/me/.cache/treetrawl"), ".ttrawl");
//! let walker = Walker::new(Path::new("/srv/data"), config);
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} files", files.len());
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::path_utils::has_suffix;
use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// The root should already be absolute; yielded paths are the root
    /// joined with the relative path of each file.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops yielding entries.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn is_excluded_dir(&self, path: &Path) -> bool {
        self.config
            .exclude_dir
            .as_deref()
            .is_some_and(|dir| path.starts_with(dir))
    }

    fn is_artifact(&self, path: &Path) -> bool {
        self.config
            .artifact_suffix
            .as_deref()
            .is_some_and(|suffix| has_suffix(path, suffix))
    }

    /// Walk the directory tree, yielding file entries.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        if let Some(dir) = &self.config.exclude_dir {
            if self.root.starts_with(dir) {
                log::warn!(
                    "{} is inside the cache directory {}; nothing will be hashed",
                    self.root.display(),
                    dir.display()
                );
            }
        }

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        walk_dir
            .into_iter()
            .filter_entry(move |entry| {
                if entry.file_type().is_dir() && self.is_excluded_dir(entry.path()) {
                    log::debug!("Skipping cache directory: {}", entry.path().display());
                    return false;
                }
                true
            })
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    return false;
                }
                true
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }

                    let path = entry.path();
                    if self.is_artifact(path) || self.is_excluded_dir(path) {
                        log::trace!("Skipping cache artifact: {}", path.display());
                        return None;
                    }

                    // With follow_links on, walkdir reports the target's
                    // type, so a symlink here is one it did not follow.
                    if file_type.is_symlink() {
                        return Self::symlinked_file(entry.into_path());
                    }

                    let metadata = match entry.metadata() {
                        Ok(m) => m,
                        Err(e) => return Some(Err(self.handle_walk_error(e))),
                    };

                    // Sockets, FIFOs and devices are not content
                    if !metadata.is_file() {
                        log::trace!("Skipping non-regular file: {}", path.display());
                        return None;
                    }

                    Some(Ok(FileEntry::new(entry.into_path(), metadata.len())))
                }
                Err(e) => match Self::dangling_link(&e) {
                    Some(path) => Some(Ok(FileEntry::new(path, 0))),
                    None => Some(Err(self.handle_walk_error(e))),
                },
            })
    }

    /// Entry for a symlink that was not followed.
    ///
    /// A link to a regular file stands for that file. Links to directories
    /// and special files are skipped. Unresolvable links are yielded as
    /// they are, so opening them fails for that one file.
    fn symlinked_file(path: PathBuf) -> Option<Result<FileEntry, ScanError>> {
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Some(Ok(FileEntry::new(path, metadata.len()))),
            Ok(_) => {
                log::trace!("Skipping symlink to non-file: {}", path.display());
                None
            }
            Err(e) => {
                log::debug!("Unresolvable symlink {}: {}", path.display(), e);
                Some(Ok(FileEntry::new(path, 0)))
            }
        }
    }

    /// Path of a dangling symlink that walkdir failed to follow.
    fn dangling_link(error: &walkdir::Error) -> Option<PathBuf> {
        let not_found = error.io_error().map(std::io::Error::kind) == Some(ErrorKind::NotFound);
        if error.depth() == 0 || !not_found {
            return None;
        }
        let path = error.path()?;
        fs::symlink_metadata(path)
            .is_ok_and(|m| m.file_type().is_symlink())
            .then(|| path.to_path_buf())
    }

    /// Convert a walkdir error into a [`ScanError`].
    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if error.loop_ancestor().is_some() {
            log::warn!("Symlink loop detected at {}", path.display());
            return ScanError::Loop(path);
        }

        match error.io_error().map(std::io::Error::kind) {
            Some(ErrorKind::PermissionDenied) => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path)
            }
            Some(ErrorKind::NotFound) => {
                log::debug!("Entry vanished during walk: {}", path.display());
                ScanError::NotFound(path)
            }
            _ => {
                log::warn!("Walker error for {}: {}", path.display(), error);
                let source = error
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                ScanError::Io { path, source }
            }
        }
    }
}
