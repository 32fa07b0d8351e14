use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use watchrun::watch::WatchRegistrar;

/// A `WatchRegistrar` that remembers every directory it was given.
///
/// Clones share state, so a test can keep one copy and hand the other to
/// the crawler or watcher.
#[derive(Debug, Clone, Default)]
pub struct RecordingRegistrar {
    registered: Arc<Mutex<Vec<PathBuf>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make registration of `path` fail, as if the watch limit was hit.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        self.failing
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf());
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.registered.lock().unwrap().clone()
    }

    pub fn is_registered(&self, path: impl AsRef<Path>) -> bool {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .any(|p| p == path.as_ref())
    }
}

impl WatchRegistrar for RecordingRegistrar {
    fn register(&mut self, dir: &Path) -> Result<()> {
        if self.failing.lock().unwrap().contains(dir) {
            bail!("no space left on device (watch limit reached) for {:?}", dir);
        }
        self.registered.lock().unwrap().push(dir.to_path_buf());
        Ok(())
    }
}
