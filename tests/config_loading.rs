use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use watchrun::config::{load_and_validate, load_from_path};
use watchrun::errors::WatchrunError;
use watchrun::watch::{normalize_path, PathFilter};
use watchrun_test_utils::builders::ConfigFileBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> std::io::Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Watchrun.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn minimal_config_gets_defaults() -> TestResult {
    let (_dir, path) = write_config(r#"commands = ["cargo build"]"#)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.root(), &PathBuf::from("."));
    assert!(cfg.ignore().is_empty());
    assert_eq!(cfg.commands(), ["cargo build".to_string()]);
    assert_eq!(cfg.debounce_timeout(), Duration::from_millis(100));
    assert_eq!(cfg.run_delay(), Duration::from_millis(200));
    assert_eq!(cfg.log_level(), None);
    assert!(cfg.log_files().is_empty());
    assert!(cfg.clear_screen());
    Ok(())
}

#[test]
fn full_config_is_read_verbatim() -> TestResult {
    let (_dir, path) = write_config(
        r#"
root = "src"
ignore = [".git", "target", "*.log"]
commands = ["make", "./bin/server --port 8080"]
timeout = 250
delay = 0
log_level = "debug"
log_files = ["src/logs/watchrun.log"]
clear_screen = false
"#,
    )?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.root(), &PathBuf::from("src"));
    assert_eq!(cfg.ignore(), [".git", "target", "*.log"]);
    assert_eq!(cfg.commands().len(), 2);
    assert_eq!(cfg.debounce_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.run_delay(), Duration::ZERO);
    assert_eq!(cfg.log_level(), Some("debug"));
    assert!(!cfg.clear_screen());
    assert_eq!(
        cfg.effective_ignore(),
        [".git", "target", "*.log", "logs/watchrun.log"]
    );
    Ok(())
}

#[test]
fn missing_commands_is_rejected() -> TestResult {
    let (_dir, path) = write_config(r#"root = ".""#)?;

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, WatchrunError::ConfigError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let (_dir, path) = write_config(
        r#"
commands = ["true"]
debounce = 10
"#,
    )?;

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, WatchrunError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn wrong_value_type_is_a_toml_error() -> TestResult {
    let (_dir, path) = write_config(
        r#"
commands = ["true"]
timeout = "fast"
"#,
    )?;

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, WatchrunError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Watchrun.toml").unwrap_err();
    assert!(matches!(err, WatchrunError::IoError(_)), "got {err:?}");
}

#[test]
fn builder_produces_validated_config() {
    let cfg = ConfigFileBuilder::new()
        .command("echo A")
        .command("echo B")
        .ignore("*.tmp")
        .log_file("./out.log")
        .timeout_ms(50)
        .build();

    assert_eq!(cfg.commands().len(), 2);
    assert_eq!(cfg.debounce_timeout(), Duration::from_millis(50));
    assert_eq!(cfg.effective_ignore(), ["*.tmp", "out.log"]);
}

#[test]
fn absolute_log_file_inside_root_is_ignored() -> TestResult {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("logs").join("watchrun.log");
    let cfg = ConfigFileBuilder::new()
        .root(dir.path())
        .command("true")
        .log_file(&log)
        .build();

    let filter = PathFilter::new(cfg.effective_ignore());

    // Events arrive under the canonical root, as the watcher sees them.
    let root = dir.path().canonicalize()?;
    let event_path = root.join("logs").join("watchrun.log");
    assert!(filter.matches(&normalize_path(&root, &event_path)));
    assert!(!filter.matches(&normalize_path(&root, &root.join("main.rs"))));
    Ok(())
}

#[test]
fn log_file_outside_root_is_not_added() -> TestResult {
    let watched = tempfile::tempdir()?;
    let elsewhere = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .root(watched.path())
        .command("true")
        .ignore("*.tmp")
        .log_file(elsewhere.path().join("watchrun.log"))
        .build();

    assert_eq!(cfg.effective_ignore(), ["*.tmp"]);
    Ok(())
}
