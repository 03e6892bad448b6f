//! Cache record definitions.

use std::fmt;
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::scanner::is_well_formed_digest;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A file modification time, exact to the nanosecond.
///
/// Stored as whole seconds relative to the Unix epoch plus a non-negative
/// nanosecond fraction, so instants before 1970 have negative `secs`.
/// The [`Display`](fmt::Display) form (`"{secs}.{nanos:09}"`) is the string
/// that gets hashed into a file digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    /// Whole seconds since the Unix epoch
    pub secs: i64,
    /// Sub-second part, always below one billion
    pub nanos: u32,
}

impl Mtime {
    /// Convert a [`SystemTime`].
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self {
                secs: i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                nanos: after.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                match before.subsec_nanos() {
                    0 => Self {
                        secs: -secs,
                        nanos: 0,
                    },
                    n => Self {
                        secs: -secs - 1,
                        nanos: NANOS_PER_SEC - n,
                    },
                }
            }
        }
    }

    /// Modification time from file metadata.
    ///
    /// Platforms without mtime support map to the epoch, which still
    /// compares equal run to run.
    #[must_use]
    pub fn of(metadata: &Metadata) -> Self {
        Self::from_system_time(metadata.modified().unwrap_or(UNIX_EPOCH))
    }

    fn is_valid(self) -> bool {
        self.nanos < NANOS_PER_SEC
    }
}

impl fmt::Display for Mtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// A cached digest for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigestRecord {
    /// Absolute path of the source file
    pub path: PathBuf,
    /// Version-bound file digest
    pub digest: String,
    /// Modification time the digest was computed for
    pub mtime: Mtime,
}

impl FileDigestRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(path: PathBuf, digest: String, mtime: Mtime) -> Self {
        Self {
            path,
            digest,
            mtime,
        }
    }

    /// Whether this record still describes a file whose mtime is `current`.
    #[must_use]
    pub fn is_fresh(&self, current: Mtime) -> bool {
        self.mtime == current
    }
}

/// On-disk form of a [`FileDigestRecord`]; the path is implied by the
/// record's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub digest: String,
    pub mtime: Mtime,
}

impl StoredRecord {
    pub(crate) fn is_well_formed(&self) -> bool {
        is_well_formed_digest(&self.digest) && self.mtime.is_valid()
    }
}

impl From<&FileDigestRecord> for StoredRecord {
    fn from(record: &FileDigestRecord) -> Self {
        Self {
            digest: record.digest.clone(),
            mtime: record.mtime,
        }
    }
}
