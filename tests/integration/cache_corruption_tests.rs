use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use treetrawl::cache::{CacheMode, CacheStore, Mtime};
use treetrawl::tree::{GlobalDigest, TrawlConfig, TreeHasher};

struct Fixture {
    dir: TempDir,
    cache: TempDir,
    file: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "foo").unwrap();
        Self { dir, cache, file }
    }

    fn hasher(&self, mode: CacheMode) -> TreeHasher {
        TreeHasher::new(
            CacheStore::new(self.cache.path(), mode),
            TrawlConfig::default().with_workers(2),
        )
    }

    fn location(&self) -> PathBuf {
        CacheStore::new(self.cache.path(), CacheMode::ReadWrite).location_for(&self.file)
    }

    fn expected(&self) -> GlobalDigest {
        self.hasher(CacheMode::Disabled)
            .hash_tree(self.dir.path())
            .unwrap()
            .0
    }
}

fn overwrite(location: &Path, content: &str) {
    fs::create_dir_all(location.parent().unwrap()).unwrap();
    fs::write(location, content).unwrap();
}

fn assert_recovers(fx: &Fixture) {
    let th = fx.hasher(CacheMode::ReadWrite);

    let (digest, summary) = th.hash_tree(fx.dir.path()).unwrap();
    assert_eq!(digest, fx.expected());
    assert_eq!(summary.hashed, 1, "corrupt record must be a miss");

    let (again, summary) = th.hash_tree(fx.dir.path()).unwrap();
    assert_eq!(again, digest);
    assert_eq!(summary.cache_hits, 1, "record must be rewritten");
}

#[test]
fn test_garbage_record() {
    let fx = Fixture::new();
    overwrite(&fx.location(), "\u{0}\u{1}not json at all");
    assert_recovers(&fx);
}

#[test]
fn test_truncated_record() {
    let fx = Fixture::new();
    overwrite(&fx.location(), r#"{"digest":"0123456789abcdef","mti"#);
    assert_recovers(&fx);
}

#[test]
fn test_empty_record() {
    let fx = Fixture::new();
    overwrite(&fx.location(), "");
    assert_recovers(&fx);
}

#[test]
fn test_record_missing_mtime() {
    let fx = Fixture::new();
    overwrite(&fx.location(), r#"{"digest":"0123456789abcdef"}"#);
    assert_recovers(&fx);
}

#[test]
fn test_record_with_malformed_digest() {
    let fx = Fixture::new();
    let mtime = Mtime::of(&fs::metadata(&fx.file).unwrap());
    let record = serde_json::json!({
        "digest": "NOT-A-DIGEST",
        "mtime": { "secs": mtime.secs, "nanos": mtime.nanos },
    });
    overwrite(&fx.location(), &record.to_string());
    assert_recovers(&fx);
}

#[test]
fn test_record_for_older_version() {
    let fx = Fixture::new();
    let mtime = Mtime::of(&fs::metadata(&fx.file).unwrap());
    let record = serde_json::json!({
        "digest": "0123456789abcdef",
        "mtime": { "secs": mtime.secs - 1, "nanos": mtime.nanos },
    });
    overwrite(&fx.location(), &record.to_string());
    assert_recovers(&fx);
}

#[test]
fn test_refresh_repairs_tampered_record() {
    let fx = Fixture::new();
    let expected = fx.expected();

    // Well formed and fresh, but wrong: a normal run trusts it
    let mtime = Mtime::of(&fs::metadata(&fx.file).unwrap());
    let record = serde_json::json!({
        "digest": "0123456789abcdef",
        "mtime": { "secs": mtime.secs, "nanos": mtime.nanos },
    });
    overwrite(&fx.location(), &record.to_string());

    let (trusted, summary) = fx.hasher(CacheMode::ReadWrite).hash_tree(fx.dir.path()).unwrap();
    assert_eq!(summary.cache_hits, 1);
    assert_ne!(trusted, expected);

    let (refreshed, _) = fx.hasher(CacheMode::Refresh).hash_tree(fx.dir.path()).unwrap();
    assert_eq!(refreshed, expected);

    let (repaired, summary) = fx.hasher(CacheMode::ReadWrite).hash_tree(fx.dir.path()).unwrap();
    assert_eq!(repaired, expected);
    assert_eq!(summary.cache_hits, 1);
}

#[test]
fn test_directory_in_place_of_record() {
    let fx = Fixture::new();
    let location = fx.location();
    fs::create_dir_all(location.join("occupied")).unwrap();

    let (digest, summary) = fx.hasher(CacheMode::ReadWrite).hash_tree(fx.dir.path()).unwrap();
    assert_eq!(digest, fx.expected());
    assert_eq!(summary.hashed, 1);
    assert_eq!(summary.cache_write_failures, 1);
}
