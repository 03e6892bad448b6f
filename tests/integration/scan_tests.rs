use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use treetrawl::cache::{reclaim, CacheMode, CacheStore, Mtime};
use treetrawl::scanner::Hasher;
use treetrawl::tree::{combine, hash_directory, TrawlConfig, TreeHasher};

fn file_digest(path: &Path) -> String {
    let mtime = Mtime::of(&fs::metadata(path).unwrap());
    Hasher::new().file_digest(path, mtime).unwrap()
}

fn uncached_digest(dir: &Path, workers: usize) -> String {
    let cache = tempdir().unwrap();
    TreeHasher::new(
        CacheStore::new(cache.path(), CacheMode::Disabled),
        TrawlConfig::default().with_workers(workers),
    )
    .hash_tree(dir)
    .unwrap()
    .0
    .into_string()
}

#[test]
fn test_two_file_scenario() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "foo").unwrap();
    fs::write(&b, "bar").unwrap();

    let d_a = file_digest(&a);
    let d_b = file_digest(&b);

    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    let th = TreeHasher::new(store.clone(), TrawlConfig::default().with_workers(2));

    let (digest, _) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(digest, combine([&d_a, &d_b]));
    assert_eq!(digest, combine([&d_b, &d_a]));

    fs::remove_file(&b).unwrap();
    let stats = reclaim(&store, dir.path());
    assert_eq!(stats.removed, 1);
    assert!(!store.location_for(&b).exists());

    let (digest, summary) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(digest, combine([&d_a]));
    assert_eq!(summary.cache_hits, 1);
}

#[test]
fn test_empty_directory_digest() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();

    for _ in 0..2 {
        let digest = hash_directory(dir.path(), cache_dir.path(), true, 4).unwrap();
        assert_eq!(digest.as_str(), "2d06800538d394c2");
    }
}

#[test]
fn test_only_empty_subdirectories() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
    fs::create_dir_all(dir.path().join("d")).unwrap();

    assert_eq!(uncached_digest(dir.path(), 2), "2d06800538d394c2");
}

#[test]
fn test_nested_files_are_included() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("top.txt"), "top").unwrap();
    let before = uncached_digest(dir.path(), 2);

    fs::create_dir_all(dir.path().join("x/y")).unwrap();
    fs::write(dir.path().join("x/y/deep.txt"), "deep").unwrap();

    assert_ne!(uncached_digest(dir.path(), 2), before);
}

#[test]
fn test_digest_independent_of_worker_count() {
    let dir = tempdir().unwrap();
    for i in 0..40 {
        let sub = dir.path().join(format!("d{}", i % 5));
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join(format!("f{i}.bin")), vec![i as u8; i * 37]).unwrap();
    }

    let single = uncached_digest(dir.path(), 1);
    assert_eq!(uncached_digest(dir.path(), 3), single);
    assert_eq!(uncached_digest(dir.path(), 16), single);
}

#[test]
fn test_digest_independent_of_chunk_size() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("big.bin"), vec![7u8; 100_000]).unwrap();
    fs::write(dir.path().join("small.txt"), "x").unwrap();

    let cache = tempdir().unwrap();
    let digest_with = |chunk: usize| {
        TreeHasher::new(
            CacheStore::new(cache.path(), CacheMode::Disabled),
            TrawlConfig::default().with_chunk_size(chunk),
        )
        .hash_tree(dir.path())
        .unwrap()
        .0
    };

    assert_eq!(digest_with(1), digest_with(4096));
    assert_eq!(digest_with(4096), digest_with(1 << 20));
}

#[test]
fn test_rename_keeps_digest() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.txt");
    fs::write(&old, "payload").unwrap();
    set_file_mtime(&old, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    let before = uncached_digest(dir.path(), 2);

    fs::rename(&old, dir.path().join("new.txt")).unwrap();
    set_file_mtime(dir.path().join("new.txt"), FileTime::from_unix_time(1_500_000_000, 0))
        .unwrap();

    assert_eq!(uncached_digest(dir.path(), 2), before);
}

#[test]
fn test_identical_files_count_twice() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    fs::write(&a, "same").unwrap();
    set_file_mtime(&a, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    let one = uncached_digest(dir.path(), 2);

    let b = dir.path().join("b.txt");
    fs::write(&b, "same").unwrap();
    set_file_mtime(&b, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    let two = uncached_digest(dir.path(), 2);

    assert_ne!(one, two);
    assert_eq!(two, combine([file_digest(&a), file_digest(&b)]).into_string());
}

#[test]
fn test_cache_inside_target_is_excluded() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();
    let cache_root = dir.path().join(".cache");

    let th = TreeHasher::new(
        CacheStore::new(&cache_root, CacheMode::ReadWrite),
        TrawlConfig::default(),
    );
    let (first, summary) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(summary.files, 1);
    assert!(cache_root.is_dir());

    let (second, summary) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(second, first);
}

#[test]
fn test_stray_artifacts_are_not_hashed() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();
    fs::write(dir.path().join("leftover.ttrawl"), "{}").unwrap();

    let cache = tempdir().unwrap();
    let (_, summary) = TreeHasher::new(
        CacheStore::new(cache.path(), CacheMode::Disabled),
        TrawlConfig::default(),
    )
    .hash_tree(dir.path())
    .unwrap();
    assert_eq!(summary.files, 1);
}

#[test]
fn test_hash_directory_with_and_without_cache() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();
    fs::write(dir.path().join("b.txt"), "bar").unwrap();

    let cached = hash_directory(dir.path(), cache_dir.path(), true, 2).unwrap();
    let cached_again = hash_directory(dir.path(), cache_dir.path(), true, 2).unwrap();
    let uncached = hash_directory(dir.path(), cache_dir.path(), false, 2).unwrap();

    assert_eq!(cached, cached_again);
    assert_eq!(cached, uncached);
}

#[cfg(unix)]
#[test]
fn test_symlinked_file_contributes() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    let target = outside.path().join("t.txt");
    fs::write(&target, "linked").unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();

    let cache_dir = tempdir().unwrap();
    let before = hash_directory(dir.path(), cache_dir.path(), false, 2).unwrap();

    let link = dir.path().join("link.txt");
    symlink(&target, &link).unwrap();
    let after = hash_directory(dir.path(), cache_dir.path(), false, 2).unwrap();
    assert_ne!(before, after);

    // The link stands for its target's content and mtime
    let expected = combine([file_digest(&dir.path().join("a.txt")), file_digest(&target)]);
    assert_eq!(after, expected);

    // Cached under the link path, and reused
    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    let th = TreeHasher::new(store.clone(), TrawlConfig::default());
    th.hash_tree(dir.path()).unwrap();
    assert!(store.location_for(&link).is_file());
    let (again, summary) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(again, expected);
    assert_eq!(summary.cache_hits, 2);
}

#[cfg(unix)]
#[test]
fn test_symlinked_dirs_entered_only_when_followed() {
    use std::os::unix::fs::symlink;

    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    fs::write(outside.path().join("inner.txt"), "inner").unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();
    symlink(outside.path(), dir.path().join("linked_dir")).unwrap();

    let cache = tempdir().unwrap();
    let run = |follow: bool| {
        TreeHasher::new(
            CacheStore::new(cache.path(), CacheMode::Disabled),
            TrawlConfig::default().with_follow_symlinks(follow),
        )
        .hash_tree(dir.path())
        .unwrap()
    };

    let (_, plain) = run(false);
    assert_eq!(plain.files, 1);

    let (_, followed) = run(true);
    assert_eq!(followed.files, 2);
}
