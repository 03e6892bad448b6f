//! File-per-record cache store mirroring source paths under a cache root.
//!
//! A source file `/srv/data/a.csv` is cached at
//! `<root>/srv/data/a.csv.ttrawl`. The mapping is a pure function of the
//! absolute path, and [`CacheStore::source_for`] is its exact inverse, which
//! is what lets the reclaimer walk the cache and find orphans.
//!
//! Mirrored directory names never end in the record suffix: a source
//! directory `d/foo.ttrawl/` is mirrored as `d/foo.ttrawl_/`, so it cannot
//! collide with the record of a file `d/foo`. A name that already ends in
//! the suffix plus underscores gains one more underscore, which keeps the
//! mapping one to one.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::Builder;

use super::entry::{FileDigestRecord, Mtime, StoredRecord};
use super::{CacheError, CacheMode};
use crate::scanner::path_utils::{absolute_path, append_suffix, has_suffix, strip_suffix};

/// File-name suffix marking a cache artifact.
pub const CACHE_SUFFIX: &str = ".ttrawl";

/// File-name suffix of records still being written.
pub const TEMP_SUFFIX: &str = ".ttrawl.tmp";

/// Appended to mirrored directory names that would end in [`CACHE_SUFFIX`].
const DIR_ESCAPE: &str = "_";

/// Cache of per-file digests rooted at one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    mode: CacheMode,
}

impl CacheStore {
    /// Create a store rooted at `root`.
    ///
    /// The root is made absolute so that it can be compared against walked
    /// paths. Nothing is created on disk until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: CacheMode) -> Self {
        let root = root.into();
        let root = absolute_path(&root).unwrap_or(root);
        Self { root, mode }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The read/write mode.
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Whether `path` is named like a cache artifact.
    #[must_use]
    pub fn is_artifact(path: &Path) -> bool {
        has_suffix(path, CACHE_SUFFIX)
    }

    /// Whether `path` is named like a leftover temporary record.
    #[must_use]
    pub fn is_temp_artifact(path: &Path) -> bool {
        has_suffix(path, TEMP_SUFFIX)
    }

    /// Mirror of an absolute path under the cache root, without the
    /// artifact suffix. For a directory this is where its records live.
    #[must_use]
    pub fn mirror_dir(&self, absolute: &Path) -> PathBuf {
        self.mirror_of(&strip_root(absolute))
    }

    /// Cache location of the record for the file at `absolute`.
    ///
    /// Directory components are escaped as described in the module docs;
    /// the file name itself only gains the suffix.
    #[must_use]
    pub fn location_for(&self, absolute: &Path) -> PathBuf {
        let relative = strip_root(absolute);
        match (relative.parent(), relative.file_name()) {
            (Some(parent), Some(name)) => {
                let mut location = self.mirror_of(parent);
                location.push(append_suffix(name, CACHE_SUFFIX));
                location
            }
            _ => self.root.join(CACHE_SUFFIX),
        }
    }

    /// Source path whose record lives at `location`.
    ///
    /// Returns `None` for anything that [`CacheStore::location_for`] could
    /// not have produced: paths outside the root, paths without the suffix,
    /// unescaped directories ending in the suffix, or paths with `.`/`..`
    /// components.
    #[must_use]
    pub fn source_for(&self, location: &Path) -> Option<PathBuf> {
        let relative = location.strip_prefix(&self.root).ok()?;
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let stem = strip_suffix(relative.file_name()?, CACHE_SUFFIX)?;

        let mut source = PathBuf::new();
        for dir in relative.parent()?.components() {
            let name = dir.as_os_str();
            if ends_with(name, CACHE_SUFFIX) {
                return None;
            }
            source.push(unescape_dir_name(name));
        }
        source.push(stem);
        restore_root(&source)
    }

    fn mirror_of(&self, relative: &Path) -> PathBuf {
        let mut mirror = self.root.clone();
        for component in relative.components() {
            mirror.push(escape_dir_name(component.as_os_str()));
        }
        mirror
    }

    /// Read the record stored at `location`.
    ///
    /// Missing, unreadable and malformed records are all reported as
    /// `None`; the caller recomputes and overwrites. Always `None` unless
    /// the store is in [`CacheMode::ReadWrite`].
    #[must_use]
    pub fn lookup(&self, location: &Path) -> Option<FileDigestRecord> {
        if !self.mode.reads() {
            return None;
        }

        let content = match fs::read_to_string(location) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::debug!("Unreadable cache record {}: {}", location.display(), e);
                return None;
            }
        };

        let stored: StoredRecord = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                log::debug!("Corrupt cache record {}: {}", location.display(), e);
                return None;
            }
        };
        if !stored.is_well_formed() {
            log::debug!("Malformed cache record {}", location.display());
            return None;
        }

        let path = self.source_for(location)?;
        Some(FileDigestRecord::new(path, stored.digest, stored.mtime))
    }

    /// Whether `record` is still valid for a file whose mtime is `current`.
    #[must_use]
    pub fn validate(record: &FileDigestRecord, current: Mtime) -> bool {
        record.is_fresh(current)
    }

    /// Persist `record` at `location`.
    ///
    /// Missing parent directories are created (concurrent creation is
    /// fine). The record is written to a temporary `*.ttrawl.tmp` file next
    /// to its final location and renamed over it, so readers see the old
    /// or the new record, never a torn one. No-op when caching is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if directories cannot be created or the
    /// record cannot be written.
    pub fn store(&self, location: &Path, record: &FileDigestRecord) -> Result<(), CacheError> {
        if !self.mode.writes() {
            return Ok(());
        }

        let parent = location
            .parent()
            .ok_or_else(|| CacheError::InvalidLocation(location.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

        let tmp = Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| CacheError::io(parent, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &StoredRecord::from(record))?;
            writer.flush().map_err(|e| CacheError::io(location, e))?;
        }
        tmp.persist(location)
            .map_err(|e| CacheError::io(location, e.error))?;

        log::trace!("Stored cache record {}", location.display());
        Ok(())
    }
}

fn ends_with(name: &OsStr, suffix: &str) -> bool {
    name.as_encoded_bytes().ends_with(suffix.as_bytes())
}

// Suffix followed by any run of escape marks
fn needs_escape(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    let escape = DIR_ESCAPE.as_bytes()[0];
    let end = bytes.iter().rposition(|&b| b != escape).map_or(0, |i| i + 1);
    bytes[..end].ends_with(CACHE_SUFFIX.as_bytes())
}

fn escape_dir_name(name: &OsStr) -> OsString {
    if needs_escape(name) {
        append_suffix(name, DIR_ESCAPE)
    } else {
        name.to_os_string()
    }
}

fn unescape_dir_name(name: &OsStr) -> OsString {
    match strip_suffix(name, DIR_ESCAPE) {
        Some(stem) if needs_escape(&stem) => stem,
        _ => name.to_os_string(),
    }
}

/// Relative form of an absolute path: the root and any prefix removed.
fn strip_root(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix_dir_name(prefix)),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => out.push(".."),
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

#[cfg(windows)]
fn prefix_dir_name(prefix: std::path::PrefixComponent<'_>) -> std::ffi::OsString {
    use std::path::Prefix;
    match prefix.kind() {
        Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
            char::from(letter).to_ascii_uppercase().to_string().into()
        }
        _ => prefix
            .as_os_str()
            .to_string_lossy()
            .replace(['\\', ':', '?'], "_")
            .into(),
    }
}

#[cfg(not(windows))]
fn prefix_dir_name(prefix: std::path::PrefixComponent<'_>) -> std::ffi::OsString {
    prefix.as_os_str().to_os_string()
}

#[cfg(not(windows))]
fn restore_root(relative: &Path) -> Option<PathBuf> {
    Some(Path::new("/").join(relative))
}

#[cfg(windows)]
fn restore_root(relative: &Path) -> Option<PathBuf> {
    let mut components = relative.components();
    let drive = components.next()?.as_os_str().to_str()?;
    if drive.len() != 1 || !drive.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(PathBuf::from(format!("{drive}:\\")).join(components.as_path()))
}
