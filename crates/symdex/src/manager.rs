//! The engine façade.
//!
//! A [`SymbolManager`] owns every per-file entry, the optional persistent
//! store, and the external parser, and answers the two query shapes the
//! dispatcher needs: a single document's symbols and a workspace-wide
//! substring search. It is an explicitly constructed instance handed to the
//! dispatcher by reference; there is no ambient global.
//!
//! Mutating operations take `&mut self` and assume one logical control flow
//! at a time. The surrounding dispatcher serializes calls; no internal
//! locking is attempted here.
//!
//! Store failures are never fatal: any failing store operation drops the
//! engine into in-memory-only operation, equivalent to having no store
//! configured, and the error is surfaced through diagnostics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;
use crate::entry::SymbolTableEntry;
use crate::extract::Extractor;
use crate::scan::{self, CancelToken, ScanStats};
use crate::store::SymbolStore;
use crate::tree::{SourceParser, SourceTree};
use crate::wire::SerializedSymbols;
use crate::{IndexError, Result};

/// Single-character wildcard accepted in workspace queries; translated to
/// the empty substring, which matches everything.
const MATCH_ALL_QUERY: &str = "*";

/// Unified view over in-memory entries and the persistent store.
pub struct SymbolManager {
    /// Entries keyed by canonical full path of the owning main file.
    table: HashMap<PathBuf, SymbolTableEntry>,
    store: Option<SymbolStore>,
    parser: Box<dyn SourceParser>,
    config: Config,
}

impl SymbolManager {
    /// Build an engine from configuration. A configured store that fails to
    /// open is reported and dropped; the engine starts in-memory-only.
    pub fn new(parser: Box<dyn SourceParser>, config: Config) -> Self {
        let store = match &config.store_path {
            Some(path) => match SymbolStore::open(path) {
                Ok(store) => Some(store),
                Err(err) => {
                    tracing::error!(
                        store = %path.display(),
                        error = %err,
                        "failed to open symbol store; continuing without persistence"
                    );
                    None
                }
            },
            None => None,
        };
        Self::with_store(parser, config, store)
    }

    /// Build an engine around an explicit (possibly absent) store. Lets the
    /// embedding server wire an in-memory store, and the tests too.
    pub fn with_store(
        parser: Box<dyn SourceParser>,
        config: Config,
        store: Option<SymbolStore>,
    ) -> Self {
        Self {
            table: HashMap::new(),
            store,
            parser,
            config,
        }
    }

    /// Whether a persistent store is currently in use.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Number of files with an entry in the in-memory index.
    pub fn file_count(&self) -> usize {
        self.table.len()
    }

    /// The symbols of one document as a serialized collection, or `None`
    /// when the path cannot be resolved to a known file.
    ///
    /// An entry marked modified is reloaded before answering, even when the
    /// store's timestamp check alone would have said no.
    pub fn find_document_symbols(&mut self, path: &Path) -> Result<Option<SerializedSymbols>> {
        let Some(main) = self.parser.main_file(path) else {
            tracing::debug!(path = %path.display(), "document symbols: unresolvable path");
            return Ok(None);
        };
        let key = index_key(&main);

        let force = self.table.get(&key).is_some_and(|e| e.is_modified());
        self.reload_main(&key, &main, force)?;

        let store = self.store.as_ref();
        let Some(entry) = self.table.get_mut(&key) else {
            return Ok(None);
        };
        match entry.serialized_list(store) {
            Ok(list) => Ok(Some(list)),
            Err(IndexError::Database(err)) => {
                log_degrade(&err);
                self.store = None;
                match self.table.get_mut(&key) {
                    Some(entry) => Ok(Some(entry.serialized_list(None)?)),
                    None => Ok(None),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Workspace-wide symbol search.
    ///
    /// With a store and a non-empty query this is a name-substring search in
    /// the store (`*` matches everything). Without a store, or with an empty
    /// query, the full in-memory aggregation is returned regardless of the
    /// query text; per-term filtering needs persisted state.
    pub fn find_workspace_symbols(&mut self, query: &str) -> Result<SerializedSymbols> {
        if !query.is_empty() {
            if let Some(store) = self.store.as_ref() {
                let needle = if query == MATCH_ALL_QUERY { "" } else { query };
                match store.find_symbols(needle) {
                    Ok(list) => return Ok(list),
                    Err(IndexError::Database(err)) => {
                        log_degrade(&err);
                        self.store = None;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        self.collect_serialized_symbols()
    }

    /// Concatenate every entry's cached serialized list into one collection.
    /// Linear in the total symbol count on every call; nothing is cached
    /// across calls.
    pub fn collect_serialized_symbols(&mut self) -> Result<SerializedSymbols> {
        let mut store = self.store.as_ref();
        let mut degraded = false;
        let mut parts = Vec::with_capacity(self.table.len());

        for entry in self.table.values_mut() {
            let list = match entry.serialized_list(store) {
                Ok(list) => list,
                Err(IndexError::Database(err)) => {
                    log_degrade(&err);
                    degraded = true;
                    store = None;
                    entry.serialized_list(None)?
                }
                Err(err) => return Err(err),
            };
            parts.push(list);
        }
        if degraded {
            self.store = None;
        }
        Ok(SerializedSymbols::concat(parts.iter()))
    }

    /// Re-extract a file unless the cache is already fresh.
    ///
    /// Unknown paths and parse failures are not errors: the reload is
    /// skipped, any previous cache stays in place, and `Ok(false)` is
    /// returned. `Ok(true)` means the file was actually re-extracted.
    pub fn reload(&mut self, path: &Path, force: bool) -> Result<bool> {
        let Some(main) = self.parser.main_file(path) else {
            tracing::debug!(path = %path.display(), "reload: unresolvable path");
            return Ok(false);
        };
        let key = index_key(&main);
        self.reload_main(&key, &main, force)
    }

    fn reload_main(&mut self, key: &Path, main: &Path, force: bool) -> Result<bool> {
        let needs_reload = if force {
            true
        } else {
            let store = self.store.as_ref();
            let entry = self
                .table
                .entry(key.to_path_buf())
                .or_insert_with(|| SymbolTableEntry::new(key.to_path_buf()));
            match entry.request_reload(store) {
                Ok(needed) => needed,
                Err(IndexError::Database(err)) => {
                    log_degrade(&err);
                    self.store = None;
                    true
                }
                Err(err) => return Err(err),
            }
        };
        if !needs_reload {
            tracing::debug!(file = %main.display(), "reload skipped, cache fresh");
            return Ok(false);
        }

        let tree = match self.parser.parse(main) {
            Ok(tree) => tree,
            Err(err) => {
                // Parse failure leaves the previous cache in place
                tracing::warn!(file = %main.display(), error = %err, "parse failed; keeping previous symbols");
                return Ok(false);
            }
        };

        match self.index_tree(key, &tree) {
            Ok(()) => Ok(true),
            Err(IndexError::Database(err)) => {
                log_degrade(&err);
                self.store = None;
                self.index_tree(key, &tree)?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Clear, extract, serialize: the write half of a reload.
    fn index_tree(&mut self, key: &Path, tree: &SourceTree) -> Result<()> {
        let include_enum_members = self.config.include_enum_members;
        let store = self.store.as_ref();
        let entry = self
            .table
            .entry(key.to_path_buf())
            .or_insert_with(|| SymbolTableEntry::new(key.to_path_buf()));

        entry.clear(store)?;
        Extractor::new(tree, store)
            .include_enum_members(include_enum_members)
            .run(entry)?;
        entry.serialize_all(store)
    }

    /// Mark a file stale. Picked up lazily by the next document query or
    /// explicit reload.
    pub fn file_modified(&mut self, path: &Path) {
        let Some(main) = self.parser.main_file(path) else {
            return;
        };
        let key = index_key(&main);
        self.table
            .entry(key.clone())
            .or_insert_with(|| SymbolTableEntry::new(key))
            .mark_modified();
    }

    /// Remove a file from the index entirely: its entry and, when a store is
    /// present, its persisted rows.
    pub fn remove_file(&mut self, path: &Path) -> Result<()> {
        let Some(main) = self.parser.main_file(path) else {
            return Ok(());
        };
        let key = index_key(&main);
        self.table.remove(&key);
        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.remove_file(&key) {
                if let IndexError::Database(err) = err {
                    log_degrade(&err);
                    self.store = None;
                } else {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Walk `root` and reload every file the parser recognizes. Sequential
    /// and best-effort: failures are counted, not propagated, and the token
    /// is checked between files.
    pub fn scan(&mut self, root: &Path, recursive: bool, cancel: &CancelToken) -> ScanStats {
        let started = Instant::now();
        let mut stats = ScanStats::default();

        let files =
            scan::collect_source_files(root, recursive, &self.config, self.parser.as_ref());
        tracing::info!(root = %root.display(), files = files.len(), "workspace scan started");

        for file in files {
            if cancel.is_cancelled() {
                tracing::info!(seen = stats.files_seen, "workspace scan cancelled");
                stats.cancelled = true;
                break;
            }
            stats.files_seen += 1;
            match self.reload(&file, false) {
                Ok(true) => stats.files_reloaded += 1,
                Ok(false) => stats.files_skipped += 1,
                Err(err) => {
                    tracing::warn!(file = %file.display(), error = %err, "scan: reload failed");
                    stats.files_failed += 1;
                }
            }
        }

        stats.duration = started.elapsed();
        tracing::info!(
            reloaded = stats.files_reloaded,
            skipped = stats.files_skipped,
            failed = stats.files_failed,
            "workspace scan finished"
        );
        stats
    }
}

fn log_degrade(err: &rusqlite::Error) {
    tracing::error!(error = %err, "symbol store failure; degrading to in-memory operation");
}

/// Entries are keyed by canonical full path so same-named files in
/// different directories never collide. Falls back to the path as given
/// when it cannot be canonicalized (e.g. not on disk).
fn index_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
