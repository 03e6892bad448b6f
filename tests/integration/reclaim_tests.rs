use std::fs;
use tempfile::tempdir;
use treetrawl::cache::{reclaim, CacheMode, CacheStore};
use treetrawl::tree::{TrawlConfig, TreeHasher};

#[test]
fn test_reclaim_after_delete() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "foo").unwrap();
    fs::write(&b, "bar").unwrap();

    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    let th = TreeHasher::new(store.clone(), TrawlConfig::default().with_workers(2));
    th.hash_tree(dir.path()).unwrap();

    let a_record = store.location_for(&a);
    let b_record = store.location_for(&b);
    assert!(a_record.is_file());
    assert!(b_record.is_file());

    fs::remove_file(&b).unwrap();

    let stats = reclaim(&store, dir.path());
    assert_eq!(stats.scanned, 2);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.failed, 0);
    assert!(a_record.is_file());
    assert!(!b_record.exists());

    let again = reclaim(&store, dir.path());
    assert_eq!(again.removed, 0);
    assert_eq!(again.scanned, 1);
}

#[test]
fn test_reclaim_after_directory_removed() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("gone/deeper")).unwrap();
    fs::write(dir.path().join("gone/one.txt"), "1").unwrap();
    fs::write(dir.path().join("gone/deeper/two.txt"), "2").unwrap();
    fs::write(dir.path().join("kept.txt"), "k").unwrap();

    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    TreeHasher::new(store.clone(), TrawlConfig::default())
        .hash_tree(dir.path())
        .unwrap();

    fs::remove_dir_all(dir.path().join("gone")).unwrap();

    let stats = reclaim(&store, dir.path());
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.pruned_dirs, 2);
    assert!(!store.mirror_dir(&dir.path().join("gone")).exists());
    assert!(store.location_for(&dir.path().join("kept.txt")).is_file());
}

#[test]
fn test_reclaim_runs_with_cache_disabled() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let file = dir.path().join("a.txt");
    fs::write(&file, "foo").unwrap();

    let writer = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    TreeHasher::new(writer.clone(), TrawlConfig::default())
        .hash_tree(dir.path())
        .unwrap();
    fs::remove_file(&file).unwrap();

    let disabled = CacheStore::new(cache_dir.path(), CacheMode::Disabled);
    let stats = reclaim(&disabled, dir.path());

    assert_eq!(stats.removed, 1);
    assert!(!writer.location_for(&file).exists());
}

#[test]
fn test_reclaim_leaves_other_trees_alone() {
    let one = tempdir().unwrap();
    let two = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    fs::write(one.path().join("a.txt"), "1").unwrap();
    fs::write(two.path().join("a.txt"), "2").unwrap();

    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    let th = TreeHasher::new(store.clone(), TrawlConfig::default());
    th.hash_tree(one.path()).unwrap();
    th.hash_tree(two.path()).unwrap();

    fs::remove_file(two.path().join("a.txt")).unwrap();

    // Reclaiming `one` does not look at `two`'s records
    assert_eq!(reclaim(&store, one.path()).removed, 0);
    assert!(store.location_for(&two.path().join("a.txt")).exists());

    assert_eq!(reclaim(&store, two.path()).removed, 1);
}

#[test]
fn test_reclaim_then_rehash_matches_fresh_run() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "foo").unwrap();
    fs::write(dir.path().join("b.txt"), "bar").unwrap();

    let store = CacheStore::new(cache_dir.path(), CacheMode::ReadWrite);
    let th = TreeHasher::new(store.clone(), TrawlConfig::default());
    th.hash_tree(dir.path()).unwrap();

    fs::remove_file(dir.path().join("b.txt")).unwrap();
    reclaim(&store, dir.path());
    let (after, summary) = th.hash_tree(dir.path()).unwrap();
    assert_eq!(summary.cache_hits, 1);

    let fresh_cache = tempdir().unwrap();
    let (fresh, _) = TreeHasher::new(
        CacheStore::new(fresh_cache.path(), CacheMode::ReadWrite),
        TrawlConfig::default(),
    )
    .hash_tree(dir.path())
    .unwrap();
    assert_eq!(after, fresh);
}
