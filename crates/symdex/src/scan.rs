//! Workspace scan support: cancellation, statistics, and file discovery.
//!
//! The scan itself lives on [`crate::SymbolManager`]; this module carries
//! the pieces it shares with callers. A scan is sequential (one file fully
//! processed before the next begins) so per-file clear+insert stays atomic,
//! but it checks the cancellation token between files so a large workspace
//! sweep can be interrupted cleanly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::tree::SourceParser;

/// Cooperative cancellation for a workspace scan. Cloneable; cancelling any
/// clone cancels the scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Outcome of a workspace scan.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Files handed to reload (including ones that failed).
    pub files_seen: usize,
    /// Files that were actually re-extracted.
    pub files_reloaded: usize,
    /// Files skipped because the store said they were unchanged.
    pub files_skipped: usize,
    /// Files whose reload failed (logged, scan continues).
    pub files_failed: usize,
    /// Whether the scan stopped early on cancellation.
    pub cancelled: bool,
    pub duration: Duration,
}

/// Enumerate parseable source files under `root`, honoring gitignore and
/// the configured exclude directories. Results are sorted for a stable
/// processing order.
pub(crate) fn collect_source_files(
    root: &Path,
    recursive: bool,
    config: &Config,
    parser: &dyn SourceParser,
) -> Vec<PathBuf> {
    let excluded: Vec<String> = config
        .excluded_dirs()
        .iter()
        .map(|d| d.to_string())
        .collect();

    let mut builder = ignore::WalkBuilder::new(root);
    builder.standard_filters(config.respect_gitignore);
    if !recursive {
        builder.max_depth(Some(1));
    }
    builder.filter_entry(move |entry| {
        let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
        if !is_dir {
            return true;
        }
        entry
            .file_name()
            .to_str()
            .map_or(true, |name| !excluded.iter().any(|d| d == name))
    });

    let mut files = Vec::new();
    for result in builder.build() {
        match result {
            Ok(entry) => {
                if entry.file_type().map_or(false, |t| t.is_file()) {
                    let path = entry.into_path();
                    if parser.can_parse(&path) {
                        files.push(path);
                    }
                }
            }
            Err(err) => tracing::warn!(error = %err, "walk error during scan"),
        }
    }
    files.sort();
    files
}
