//! Streaming XXH3 file hasher.
//!
//! # Overview
//!
//! [`Hasher`] reads a file in fixed-size chunks and feeds them into a
//! streaming XXH3-64 state, so hashing a file never holds more than one
//! chunk of it in memory. The content digest is then bound to a file
//! version by mixing in the digest of the file's modification time:
//!
//! ```text
//! file_digest = xxh3(hex(xxh3(content)) ++ hex(xxh3(mtime_string)))
//! ```
//!
//! All digests are 16-character lowercase hex strings.
//!
//! # Example
//!
//! ```no_run
//! use treetrawl::cache::Mtime;
//! use treetrawl::scanner::Hasher;
//! use std::path::Path;
//!
//! let hasher = Hasher::with_chunk_size(64 * 1024);
//! let path = Path::new("Cargo.toml");
//! let mtime = Mtime::of(&std::fs::metadata(path).unwrap());
//! let digest = hasher.file_digest(path, mtime).unwrap();
//! assert_eq!(digest.len(), 16);
//! ```

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

use super::HashError;
use crate::cache::Mtime;

/// Default read chunk size (1 MiB) when none is derived from system memory.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Length of every hex digest produced by this module.
pub const DIGEST_LEN: usize = 16;

/// Hex digest of `bytes`.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    digest_to_hex(xxh3_64(bytes))
}

/// Format a raw 64-bit digest as 16 lowercase hex characters.
#[must_use]
pub fn digest_to_hex(digest: u64) -> String {
    format!("{digest:016x}")
}

/// Whether `s` looks like a digest produced by this module.
#[must_use]
pub fn is_well_formed_digest(s: &str) -> bool {
    s.len() == DIGEST_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Bind a content digest to a modification time.
///
/// The two hex strings are concatenated and hashed again; this is not a
/// structural combination, so the order matters.
#[must_use]
pub fn bind_mtime(content_digest: &str, mtime: Mtime) -> String {
    let mtime_digest = digest_bytes(mtime.to_string().as_bytes());
    let mut joined = String::with_capacity(content_digest.len() + mtime_digest.len());
    joined.push_str(content_digest);
    joined.push_str(&mtime_digest);
    digest_bytes(joined.as_bytes())
}

/// Chunked content hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a hasher that reads at most `chunk_size` bytes at a time.
    ///
    /// A chunk size of zero is raised to one byte.
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            shutdown_flag: None,
        }
    }

    /// Abort reads between chunks once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The configured chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hex digest of the file's content.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] if the file cannot be opened, a read fails
    /// part way through, or shutdown is requested mid-file.
    pub fn content_digest(&self, path: &Path) -> Result<String, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        // Small files never need a full chunk; the buffer grows no further
        // than the configured chunk size even if the file grows meanwhile.
        let len_hint = file
            .metadata()
            .map(|m| usize::try_from(m.len()).unwrap_or(usize::MAX))
            .unwrap_or(self.chunk_size);
        let mut buffer = vec![0u8; self.chunk_size.min(len_hint.max(1))];

        let mut state = Xxh3::new();
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => state.update(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            }
        }

        Ok(digest_to_hex(state.digest()))
    }

    /// Version-bound digest of the file: content digest combined with the
    /// digest of `mtime`.
    ///
    /// # Errors
    ///
    /// Same as [`Hasher::content_digest`].
    pub fn file_digest(&self, path: &Path, mtime: Mtime) -> Result<String, HashError> {
        let content = self.content_digest(path)?;
        Ok(bind_mtime(&content, mtime))
    }
}
