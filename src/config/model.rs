// src/config/model.rs

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// root = "."
/// ignore = [".git", "target", "*.log"]
/// commands = ["cargo build", "./target/debug/app"]
/// timeout = 100
/// delay = 200
/// log_level = "info"
/// log_files = ["logs/watchrun.log"]
/// ```
///
/// Everything except `commands` has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Base directory to watch.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Ignore globs, evaluated against paths relative to `root`.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Command lines executed in order on every run.
    #[serde(default)]
    pub commands: Vec<String>,

    /// Debounce timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Delay between tearing down a run and starting the next, in milliseconds.
    #[serde(default = "default_delay")]
    pub delay: u64,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Extra log sinks. Each file is also added to the ignore list.
    #[serde(default)]
    pub log_files: Vec<PathBuf>,

    /// Clear the terminal before each reload.
    #[serde(default = "default_clear_screen")]
    pub clear_screen: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout() -> u64 {
    100
}

fn default_delay() -> u64 {
    200
}

fn default_clear_screen() -> bool {
    true
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            root: default_root(),
            ignore: Vec::new(),
            commands: Vec::new(),
            timeout: default_timeout(),
            delay: default_delay(),
            log_level: None,
            log_files: Vec::new(),
            clear_screen: default_clear_screen(),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holders can rely on a non-empty, well-formed pipeline.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    raw: RawConfigFile,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self { raw }
    }

    pub fn root(&self) -> &PathBuf {
        &self.raw.root
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.raw.root = root.into();
    }

    pub fn ignore(&self) -> &[String] {
        &self.raw.ignore
    }

    pub fn commands(&self) -> &[String] {
        &self.raw.commands
    }

    pub fn debounce_timeout(&self) -> Duration {
        Duration::from_millis(self.raw.timeout)
    }

    pub fn run_delay(&self) -> Duration {
        Duration::from_millis(self.raw.delay)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.raw.log_level.as_deref()
    }

    pub fn log_files(&self) -> &[PathBuf] {
        &self.raw.log_files
    }

    pub fn clear_screen(&self) -> bool {
        self.raw.clear_screen
    }

    /// Ignore patterns with every configured log file appended, so writing
    /// our own logs never looks like a source change.
    ///
    /// Relative log paths are taken from the current directory, which is
    /// where the log files are opened.
    pub fn effective_ignore(&self) -> Vec<String> {
        let cwd = std::env::current_dir().unwrap_or_default();
        self.effective_ignore_from(&cwd)
    }

    /// Like [`ConfigFile::effective_ignore`], with relative paths resolved
    /// against `cwd`.
    ///
    /// Each log file becomes a pattern relative to the canonical watch root,
    /// the form event paths are matched in. Files outside the root can never
    /// produce events and are left out.
    pub fn effective_ignore_from(&self, cwd: &Path) -> Vec<String> {
        let root = resolve_existing(&absolutize(cwd, &self.raw.root));
        let mut patterns = self.raw.ignore.clone();

        for file in &self.raw.log_files {
            let resolved = resolve_existing(&absolutize(cwd, file));
            let Ok(rel) = resolved.strip_prefix(&root) else {
                debug!(file = ?file, root = ?root, "log file outside watch root, not ignored");
                continue;
            };
            let pattern = globset::escape(&rel.to_string_lossy().replace('\\', "/"));
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        patterns
    }
}

/// Join `path` onto `base` and fold `.` and `..` lexically.
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path` and append the rest.
///
/// Log files and the root may not exist yet, but symlinked prefixes
/// (`/tmp` on macOS) must still resolve the same way the watcher's root does.
fn resolve_existing(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolve_existing(parent).join(name),
        _ => path.to_path_buf(),
    }
}
