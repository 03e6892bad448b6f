//! Path helpers shared by the walker, the cache store and the reclaimer.
//!
//! Cache locations are derived from absolute source paths, so every path
//! that reaches the cache must first be made absolute and lexically
//! normalized: the same file reached as `./a/../b.txt` and `b.txt` has to
//! produce a single cache record.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use treetrawl::scanner::path_utils::{normalize_lexically, has_suffix};
//!
//! assert_eq!(
//!     normalize_lexically(Path::new("/data/./raw/../clean/a.csv")),
//!     Path::new("/data/clean/a.csv"),
//! );
//! assert!(has_suffix(Path::new("a.csv.ttrawl"), ".ttrawl"));
//! ```

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against the current directory and drop `.` and `..`
/// components without touching the filesystem.
///
/// Symlinks are not resolved: the cache is keyed by the path the user
/// walked, not by its canonical target.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(normalize_lexically(&absolute))
}

/// Remove `.` components and fold `..` into its parent.
///
/// A `..` that would climb above the root is dropped, matching how the
/// kernel resolves `/..`.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let cannot_pop = matches!(
                    out.components().next_back(),
                    None | Some(
                        Component::RootDir | Component::Prefix(_) | Component::ParentDir
                    )
                );
                if cannot_pop {
                    if !out.has_root() {
                        out.push("..");
                    }
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether the final component of `path` ends with `suffix`.
#[must_use]
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .is_some_and(|name| name.as_encoded_bytes().ends_with(suffix.as_bytes()))
}

/// `name` with `suffix` appended.
#[must_use]
pub fn append_suffix(name: &OsStr, suffix: &str) -> OsString {
    let mut out = name.to_os_string();
    out.push(suffix);
    out
}

/// `name` with a trailing `suffix` removed, or `None` if it does not end
/// with it or nothing would remain.
#[must_use]
pub fn strip_suffix(name: &OsStr, suffix: &str) -> Option<OsString> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let stem = name.as_bytes().strip_suffix(suffix.as_bytes())?;
        (!stem.is_empty()).then(|| OsStr::from_bytes(stem).to_os_string())
    }

    #[cfg(not(unix))]
    {
        let stem = name.to_str()?.strip_suffix(suffix)?;
        (!stem.is_empty()).then(|| OsString::from(stem))
    }
}
