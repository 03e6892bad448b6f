//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform-specific config directory
//! 3. `TREETRAWL_*` environment variables
//! 4. command-line flags ([`Settings::apply_cli`])
//!
//! ```toml
//! cache_dir = "/var/cache/treetrawl"
//! threads = 8
//! chunk_size = "4MiB"
//! on_error = "fail"
//! follow_symlinks = false
//! ```

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::System;

use crate::cache::default_cache_dir;
use crate::cli::{parse_size, Cli};
use crate::tree::{default_workers, ErrorPolicy};

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "TREETRAWL_";

/// Smallest chunk size ever picked automatically.
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;

const LOW_MEMORY_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cache root; the platform cache directory when unset.
    pub cache_dir: Option<PathBuf>,
    /// Worker count; available parallelism when unset.
    pub threads: Option<usize>,
    /// Read chunk size in bytes; derived from system memory when unset.
    #[serde(deserialize_with = "deserialize_size")]
    pub chunk_size: Option<u64>,
    /// Policy for files that cannot be hashed.
    pub on_error: ErrorPolicy,
    /// Descend into symlinked directories.
    pub follow_symlinks: bool,
}

impl Settings {
    /// Load settings from the config file and environment.
    ///
    /// A missing config file is fine; a broken one is logged and the
    /// defaults are used instead.
    #[must_use]
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::figment(path.as_deref()).extract() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Figment for the given config file (if any) plus the environment.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "treetrawl").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay the flags given on the command line.
    #[must_use]
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = Some(dir.clone());
        }
        if let Some(threads) = cli.threads {
            self.threads = Some(usize::from(threads));
        }
        if let Some(size) = cli.chunk_size {
            self.chunk_size = Some(size);
        }
        if let Some(policy) = cli.on_error {
            self.on_error = policy;
        }
        if cli.follow_symlinks {
            self.follow_symlinks = true;
        }
        self
    }

    /// Effective worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.threads.unwrap_or_else(default_workers).max(1)
    }

    /// Effective chunk size for `workers` workers.
    #[must_use]
    pub fn chunk_size_for(&self, workers: usize) -> usize {
        match self.chunk_size {
            Some(size) => usize::try_from(size).unwrap_or(usize::MAX).max(1),
            None => default_chunk_size(workers),
        }
    }

    /// Effective cache root, if one can be determined.
    #[must_use]
    pub fn cache_root(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(default_cache_dir)
    }
}

/// Chunk size derived from this machine's total memory.
#[must_use]
pub fn default_chunk_size(workers: usize) -> usize {
    let mut system = System::new();
    system.refresh_memory();
    chunk_size_from_memory(system.total_memory(), workers)
}

/// 5% of `total_memory` (10% on machines with at most 2 GiB) shared among
/// `workers`, never below [`MIN_CHUNK_SIZE`].
#[must_use]
pub fn chunk_size_from_memory(total_memory: u64, workers: usize) -> usize {
    let budget = if total_memory <= LOW_MEMORY_THRESHOLD {
        total_memory / 10
    } else {
        total_memory / 20
    };
    let per_worker = budget / workers.max(1) as u64;
    usize::try_from(per_worker)
        .unwrap_or(usize::MAX)
        .max(MIN_CHUNK_SIZE)
}

/// Accept either a byte count or a human-readable size string.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    match Option::<Size>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Size::Bytes(0)) => Err(de::Error::custom("Size must be greater than zero")),
        Some(Size::Bytes(bytes)) => Ok(Some(bytes)),
        Some(Size::Text(text)) => parse_size(&text).map(Some).map_err(de::Error::custom),
    }
}
