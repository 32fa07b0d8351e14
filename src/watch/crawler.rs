// src/watch/crawler.rs

//! One-shot directory walk that registers every non-ignored directory.
//!
//! The notification backend is used in non-recursive mode, so each directory
//! has to be registered on its own. Ignored directories are pruned together
//! with their whole subtree.

use std::path::{Path, PathBuf};

use anyhow::Result as AnyResult;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::errors::{Result, WatchrunError};
use crate::fs::FileSystem;
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::normalize_path;

/// Something directories can be registered with for change notification.
pub trait WatchRegistrar: Send {
    fn register(&mut self, dir: &Path) -> AnyResult<()>;
}

impl WatchRegistrar for RecommendedWatcher {
    fn register(&mut self, dir: &Path) -> AnyResult<()> {
        self.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }
}

/// Counters describing a finished crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub registered: usize,
    pub failed: usize,
    pub pruned: usize,
}

/// Depth-first walker over a directory tree.
#[derive(Debug)]
pub struct DirectoryCrawler<'a> {
    fs: &'a dyn FileSystem,
    filter: &'a PathFilter,
    root: &'a Path,
}

impl<'a> DirectoryCrawler<'a> {
    /// `root` is the watch root; paths are matched relative to it.
    pub fn new(fs: &'a dyn FileSystem, filter: &'a PathFilter, root: &'a Path) -> Self {
        Self { fs, filter, root }
    }

    /// Walk `start` (the root, or a directory created later under it) and
    /// register it plus every non-ignored directory below.
    ///
    /// Fails only if `start` itself cannot be read. `start` is not tested
    /// against the filter; callers decide whether it is wanted.
    pub fn crawl(&self, start: &Path, registrar: &mut dyn WatchRegistrar) -> Result<CrawlReport> {
        let mut report = CrawlReport::default();

        let entries = self
            .fs
            .read_dir(start)
            .map_err(|source| WatchrunError::RootUnreadable {
                path: start.to_path_buf(),
                source,
            })?;

        self.register(start, registrar, &mut report);

        // Reverse so children pop off the stack in lexical order.
        let mut stack: Vec<PathBuf> = entries.into_iter().rev().collect();

        while let Some(path) = stack.pop() {
            let rel = normalize_path(self.root, &path);
            let is_dir = self.fs.is_dir(&path);

            if let Some(pattern) = self.filter.matching_pattern(&rel) {
                if is_dir {
                    debug!(path = %rel, pattern, "skipping ignored directory");
                    report.pruned += 1;
                }
                continue;
            }

            if !is_dir {
                continue;
            }

            self.register(&path, registrar, &mut report);

            match self.fs.read_dir(&path) {
                Ok(children) => stack.extend(children.into_iter().rev()),
                Err(err) => {
                    warn!(directory = %rel, error = %err, "unable to read directory, not descending");
                }
            }
        }

        debug!(
            start = ?start,
            registered = report.registered,
            failed = report.failed,
            pruned = report.pruned,
            "crawl finished"
        );
        Ok(report)
    }

    fn register(&self, dir: &Path, registrar: &mut dyn WatchRegistrar, report: &mut CrawlReport) {
        match registrar.register(dir) {
            Ok(()) => {
                debug!(directory = ?dir, "watching directory");
                report.registered += 1;
            }
            Err(err) => {
                warn!(directory = ?dir, error = %err, "error occurred watching a directory");
                report.failed += 1;
            }
        }
    }
}
