//! Orphan reclamation: delete cache records whose source file is gone.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use walkdir::WalkDir;

use super::CacheStore;
use crate::scanner::path_utils::absolute_path;

/// Outcome of a reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Cache artifacts examined
    pub scanned: usize,
    /// Orphaned artifacts deleted
    pub removed: usize,
    /// Orphans that could not be deleted
    pub failed: usize,
    /// Leftover temporary records deleted
    pub stale_temps: usize,
    /// Empty mirror directories removed
    pub pruned_dirs: usize,
}

/// Delete every record under the mirror of `directory` whose source file no
/// longer exists, then drop mirror directories left empty.
///
/// Temporary records left behind by an interrupted write are deleted too.
/// A concurrent run writing the same record then loses that one write.
///
/// A missing cache root or mirror is a no-op. Individual failures are
/// logged and counted; the pass always runs to the end.
pub fn reclaim(store: &CacheStore, directory: &Path) -> ReclaimStats {
    let mut stats = ReclaimStats::default();

    let directory = match absolute_path(directory) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Cannot resolve {}: {}", directory.display(), e);
            return stats;
        }
    };
    let mirror = store.mirror_dir(&directory);
    if !mirror.is_dir() {
        log::debug!("No cache mirror at {}, nothing to reclaim", mirror.display());
        return stats;
    }

    for entry in WalkDir::new(&mirror) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable cache entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if CacheStore::is_temp_artifact(entry.path()) {
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    log::debug!("Removed stale temporary record {}", entry.path().display());
                    stats.stale_temps += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("Failed to remove {}: {}", entry.path().display(), e);
                    stats.failed += 1;
                }
            }
            continue;
        }
        if !CacheStore::is_artifact(entry.path()) {
            continue;
        }
        stats.scanned += 1;

        let Some(source) = store.source_for(entry.path()) else {
            continue;
        };
        match source.try_exists() {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                log::debug!("Cannot check {}, keeping its record: {}", source.display(), e);
                continue;
            }
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                log::debug!("Removed orphaned record for {}", source.display());
                stats.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(
                    "Failed to remove orphaned record {}: {}",
                    entry.path().display(),
                    e
                );
                stats.failed += 1;
            }
        }
    }

    stats.pruned_dirs = prune_empty_dirs(&mirror);

    if stats.removed > 0 || stats.failed > 0 {
        log::info!(
            "Reclaimed {} orphaned records ({} failed) under {}",
            stats.removed,
            stats.failed,
            mirror.display()
        );
    }
    stats
}

/// Remove empty directories below `mirror`, deepest first. `mirror` itself
/// is kept.
fn prune_empty_dirs(mirror: &Path) -> usize {
    let mut pruned = 0;
    for entry in WalkDir::new(mirror)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        // Fails harmlessly on non-empty directories
        if fs::remove_dir(entry.path()).is_ok() {
            log::trace!("Pruned empty cache directory {}", entry.path().display());
            pruned += 1;
        }
    }
    pruned
}
