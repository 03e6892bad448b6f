//! Command-line interface definitions for treetrawl.
//!
//! There are no subcommands: the tool takes one directory and prints its
//! digest. Every option that has a configuration-file counterpart is
//! optional here so that an absent flag leaves the configured value alone.
//!
//! # Example
//!
//! ```bash
//! # Digest a directory, reusing cached per-file digests
//! treetrawl ~/projects/site
//!
//! # Ignore the cache entirely
//! treetrawl --no-cache ~/projects/site
//!
//! # Recompute everything and rewrite the cache, with 8 workers
//! treetrawl --refresh -t 8 ~/projects/site
//!
//! # Abort on the first unreadable file
//! treetrawl --on-error fail ~/projects/site
//! ```

use bytesize::ByteSize;
use clap::Parser;
use std::path::PathBuf;

use crate::cache::CacheMode;
use crate::tree::ErrorPolicy;

/// Deterministic, cache-backed fingerprint of a directory tree.
///
/// Prints one digest that changes whenever any file's content or
/// modification time under DIRECTORY changes, and stays the same no matter
/// in which order the files are visited.
#[derive(Debug, Parser)]
#[command(name = "treetrawl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to fingerprint
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Disable the per-file digest cache (no reads, no writes)
    #[arg(long, conflicts_with = "refresh")]
    pub no_cache: bool,

    /// Ignore cached digests, recompute every file and overwrite the cache
    #[arg(long)]
    pub refresh: bool,

    /// Number of hashing workers (default: available parallelism)
    #[arg(short = 't', long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: Option<u16>,

    /// Read chunk size per worker (e.g. 64KiB, 4MiB)
    ///
    /// Defaults to a share of system memory divided by the worker count.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Cache directory
    ///
    /// If not specified, a platform-specific cache path is used.
    #[arg(long, value_name = "PATH", env = "TREETRAWL_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// What to do with files that cannot be read
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_error: Option<ErrorPolicy>,

    /// Descend into symbolically linked directories
    ///
    /// Symlinks to files are always hashed. Cycles are detected and
    /// reported, not followed.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Show a progress bar on stderr
    #[arg(long)]
    pub progress: bool,

    /// Increase verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

impl Cli {
    /// Cache mode selected by `--no-cache` / `--refresh`.
    #[must_use]
    pub fn cache_mode(&self) -> CacheMode {
        if self.no_cache {
            CacheMode::Disabled
        } else if self.refresh {
            CacheMode::Refresh
        } else {
            CacheMode::ReadWrite
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Accepts whatever [`ByteSize`] parses: plain byte counts and decimal or
/// binary suffixes. Zero is rejected.
///
/// # Examples
///
/// ```
/// use treetrawl::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("4MiB").unwrap(), 4 * 1_048_576);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, not a size, or zero.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let size: ByteSize = s.parse().map_err(|e| format!("Invalid size '{s}': {e}"))?;
    if size.as_u64() == 0 {
        return Err("Size must be greater than zero".to_string());
    }
    Ok(size.as_u64())
}
