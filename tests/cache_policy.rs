use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use autopatcher::fs::RealFileSystem;
use autopatcher::job::cache::{cache_is_fresh, DEFAULT_CACHE_DIR_NAME};
use autopatcher::job::EditorCache;
use autopatcher_test_utils::builders::{ConfigBuilder, Sandbox};
use autopatcher_test_utils::init_tracing;

const WEEK: Duration = Duration::from_secs(168 * 3600);

#[test]
fn freshness_window() {
    let now = UNIX_EPOCH + Duration::from_secs(10_000_000);
    assert!(cache_is_fresh(now - Duration::from_secs(60), now, WEEK));
    assert!(cache_is_fresh(now - WEEK, now, WEEK));
    assert!(!cache_is_fresh(now - WEEK - Duration::from_secs(1), now, WEEK));
    // Clock skew: a cache from the future is still usable.
    assert!(cache_is_fresh(now + Duration::from_secs(30), now, WEEK));
}

#[test]
fn disabled_cache_is_never_used() {
    let sandbox = Sandbox::new();
    let dir = sandbox.editor_dir().join(DEFAULT_CACHE_DIR_NAME);
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("Fallout4.esm.cache"), b"x").expect("write");

    let cache = EditorCache::new(Arc::new(RealFileSystem), false, dir, WEEK);
    assert!(!cache.should_use());
}

#[test]
fn enabled_cache_needs_a_recent_cache_file() {
    init_tracing();
    let sandbox = Sandbox::new();
    let cfg = ConfigBuilder::for_sandbox(&sandbox)
        .param("use_editor_cache", true)
        .param("max_cache_age_hours", 1_i64)
        .provider(&sandbox);
    let cache = EditorCache::from_provider(&cfg, Arc::new(RealFileSystem), &sandbox.editor_dir());
    assert_eq!(cache.dir(), sandbox.editor_dir().join(DEFAULT_CACHE_DIR_NAME));

    // No directory yet.
    assert!(!cache.should_use());

    fs::create_dir_all(cache.dir()).expect("mkdir");
    let file = cache.dir().join("Fallout4.esm.cache");
    fs::write(&file, b"x").expect("write");
    fs::write(cache.dir().join("readme.txt"), b"not a cache").expect("write");
    assert!(cache.should_use());
    assert_eq!(cache.cache_files(), vec![file.clone()]);

    let old = SystemTime::now() - Duration::from_secs(2 * 3600);
    fs::File::options()
        .write(true)
        .open(&file)
        .and_then(|f| f.set_modified(old))
        .expect("set mtime");
    assert!(!cache.should_use());
}

#[test]
fn clear_removes_only_cache_files() -> anyhow::Result<()> {
    init_tracing();
    let sandbox = Sandbox::new();
    let dir = sandbox.editor_dir().join(DEFAULT_CACHE_DIR_NAME);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("a.cache"), b"1")?;
    fs::write(dir.join("b.CACHE"), b"2")?;
    fs::write(dir.join("keep.txt"), b"3")?;

    let cache = EditorCache::new(Arc::new(RealFileSystem), true, dir.clone(), WEEK);
    assert_eq!(cache.clear()?, 2);
    assert!(dir.join("keep.txt").is_file());
    assert!(cache.cache_files().is_empty());
    Ok(())
}
