//! treetrawl - Directory Tree Fingerprinter
//!
//! Computes one deterministic digest for a whole directory tree. Per-file
//! digests (XXH3-64 over the content, bound to the modification time) are
//! cached in a mirror of the tree under the user's cache directory, so
//! unchanged files are not read again on the next run. Files are hashed in
//! parallel and the digests are combined order-independently.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod tree;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::cache::{reclaim, CacheStore};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::ExitCode;
use crate::progress::Progress;
use crate::tree::{resolve_root, TrawlConfig, TreeHasher};

/// Run the application with parsed arguments.
///
/// Prints the global digest of `cli.directory` on stdout. Orphaned cache
/// records under the directory are reclaimed first, whatever the cache mode.
///
/// # Errors
///
/// Returns an error if the directory is invalid, the cache directory cannot
/// be determined, the run is interrupted, or a file fails under
/// `--on-error fail`. [`ExitCode::for_error`] maps these to exit codes.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let settings = Settings::load().apply_cli(&cli);
    log::debug!("Effective settings: {:?}", settings);

    let root = resolve_root(&cli.directory)?;

    let handler = signal::install_handler()?;

    let cache_root = settings
        .cache_root()
        .context("Cannot determine a cache directory; pass --cache-dir")?;
    let store = CacheStore::new(cache_root, cli.cache_mode());
    log::debug!(
        "Cache at {} ({:?})",
        store.root().display(),
        store.mode()
    );

    let stats = reclaim(&store, &root);
    log::debug!("Reclaim: {:?}", stats);

    let workers = settings.workers();
    let chunk_size = settings.chunk_size_for(workers);
    log::info!(
        "Using {} workers with {} read chunks",
        workers,
        ByteSize::b(chunk_size as u64)
    );

    let mut config = TrawlConfig::default()
        .with_workers(workers)
        .with_chunk_size(chunk_size)
        .with_error_policy(settings.on_error)
        .with_follow_symlinks(settings.follow_symlinks)
        .with_shutdown_flag(handler.get_flag());
    if cli.progress {
        config = config.with_progress_callback(Arc::new(Progress::new(cli.quiet)));
    }

    let (digest, summary) = TreeHasher::new(store, config).hash_tree(&root)?;

    if summary.failed > 0 {
        log::warn!(
            "{} of {} files could not be read and are not part of the digest",
            summary.failed,
            summary.files
        );
    }
    if summary.cache_write_failures > 0 {
        log::warn!(
            "{} digests could not be cached and will be recomputed next run",
            summary.cache_write_failures
        );
    }

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{digest}").context("Failed to write digest")?;

    Ok(ExitCode::Success)
}
