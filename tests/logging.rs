use std::fs;
use std::path::Path;

use autopatcher::logging::{init_logging, parse_level_str, run_log_path};
use tracing::Level;

#[test]
fn unwritable_log_file_is_reported_not_swallowed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("output");
    fs::write(&blocker, b"a file where the output dir should be").expect("write");

    let err = init_logging(None, Some(&blocker.join("logs/run/autopatcher.log")))
        .expect_err("log dir cannot be created under a file");
    assert!(format!("{err:#}").contains("log dir"), "{err:#}");
}

#[test]
fn level_names_from_the_environment() {
    assert_eq!(parse_level_str(" WARNING "), Some(Level::WARN));
    assert_eq!(parse_level_str("warn"), Some(Level::WARN));
    assert_eq!(parse_level_str("Debug"), Some(Level::DEBUG));
    assert_eq!(parse_level_str("trace"), Some(Level::TRACE));
    assert_eq!(parse_level_str("loud"), None);
}

#[test]
fn run_log_lives_in_its_own_subdirectory() {
    let path = run_log_path(Path::new("/out"));
    assert_eq!(path.parent(), Some(Path::new("/out/logs/run")));
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(name.starts_with("autopatcher_") && name.ends_with(".log"), "{name}");
}
