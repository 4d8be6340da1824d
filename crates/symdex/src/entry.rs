//! Per-file symbol table entries.
//!
//! A [`SymbolTableEntry`] owns the in-memory symbol list for exactly one
//! file, a `modified` flag set when the file is known to have changed, and a
//! lazily-computed serialized cache of the list. Once serialized the record
//! objects are released; subsequent reads go through the cache or, when a
//! store is configured and the cache is cold, through the store.

use std::path::{Path, PathBuf};

use crate::store::{self, SymbolRow, SymbolStore};
use crate::wire::SerializedSymbols;
use crate::{Location, Result, SymbolKind, SymbolRecord};

/// State for one indexed file. Created on first reference to the file key,
/// destroyed only by explicit removal, never shared across files.
#[derive(Debug)]
pub struct SymbolTableEntry {
    file: PathBuf,
    records: Vec<SymbolRecord>,
    modified: bool,
    cached: Option<SerializedSymbols>,
}

impl SymbolTableEntry {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            records: Vec::new(),
            modified: false,
            cached: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Mark this file as changed; the next query-time freshness check will
    /// force a reload.
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[SymbolRecord] {
        &self.records
    }

    /// Drop all in-memory records and the serialized cache, reset
    /// `modified`, and delete this file's persisted rows. Must run before a
    /// re-extraction pass so no stale records linger.
    pub fn clear(&mut self, store: Option<&SymbolStore>) -> Result<()> {
        self.records.clear();
        self.cached = None;
        self.modified = false;
        if let Some(store) = store {
            store.clear_symbols(&self.file)?;
        }
        Ok(())
    }

    /// Append a record, returning it for further decoration (container
    /// name, flags). Used by the extractor.
    pub fn add_symbol(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        location: Location,
    ) -> &mut SymbolRecord {
        let index = self.records.len();
        self.records
            .push(SymbolRecord::new(name.into(), kind, location));
        &mut self.records[index]
    }

    /// Serialize every record, build the cached list, persist the rows in
    /// batches, then release the record sequence.
    pub fn serialize_all(&mut self, store: Option<&SymbolStore>) -> Result<()> {
        for record in &mut self.records {
            record.serialize()?;
        }
        let list = SerializedSymbols::from_records(
            self.records.iter().filter_map(|r| r.serialized.as_deref()),
        );

        if let Some(store) = store {
            let rows: Vec<SymbolRow> = self
                .records
                .iter()
                .map(|r| SymbolRow {
                    name: r.name.clone(),
                    path: r.location.file.clone(),
                    serialized: r.serialized.clone().unwrap_or_default(),
                })
                .collect();
            store.insert_symbols(&rows)?;
        }

        self.cached = Some(list);
        self.records = Vec::new();
        Ok(())
    }

    /// The cached serialized list. A cold cache rehydrates from the store
    /// when one is present, and otherwise serializes whatever records are
    /// still in memory.
    pub fn serialized_list(&mut self, store: Option<&SymbolStore>) -> Result<SerializedSymbols> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }

        if let Some(store) = store {
            let list = store.find_all_symbols(&self.file.to_string_lossy())?;
            self.cached = Some(list.clone());
            return Ok(list);
        }

        for record in &mut self.records {
            record.serialize()?;
        }
        let list = SerializedSymbols::from_records(
            self.records.iter().filter_map(|r| r.serialized.as_deref()),
        );
        self.cached = Some(list.clone());
        Ok(list)
    }

    /// Whether this file needs re-extraction. With a store, true iff the
    /// path is unrecorded or its on-disk mtime differs from the recorded one
    /// (the new mtime is recorded on the way through). Without a store there
    /// is no cheap invalidation test, so the answer is always yes.
    pub fn request_reload(&self, store: Option<&SymbolStore>) -> Result<bool> {
        let Some(store) = store else {
            return Ok(true);
        };
        if store.has_file(&self.file)? && !store.file_modified(&self.file)? {
            return Ok(false);
        }
        store.touch_file(&self.file, store::disk_mtime(&self.file)?)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_three(entry: &mut SymbolTableEntry) {
        for (i, name) in ["Alpha", "Beta", "Gamma"].iter().enumerate() {
            entry.add_symbol(
                *name,
                SymbolKind::Constant,
                Location::new(entry.file().to_path_buf(), i as u32, 2, name.len() as u32),
            );
        }
    }

    #[test]
    fn test_add_and_clear() {
        let mut entry = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        add_three(&mut entry);
        entry.mark_modified();
        assert_eq!(entry.record_count(), 3);
        assert!(entry.is_modified());

        entry.clear(None).unwrap();
        assert_eq!(entry.record_count(), 0);
        assert!(!entry.is_modified());
        assert!(entry.serialized_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_serialize_all_releases_records() {
        let mut entry = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        add_three(&mut entry);

        entry.serialize_all(None).unwrap();
        assert_eq!(entry.record_count(), 0);

        let list = entry.serialized_list(None).unwrap();
        let names: Vec<String> = list.decode().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_serialize_all_persists_rows() {
        let store = SymbolStore::in_memory().unwrap();
        let mut entry = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        add_three(&mut entry);

        entry.serialize_all(Some(&store)).unwrap();
        assert_eq!(store.count_symbols().unwrap(), 3);
    }

    #[test]
    fn test_clear_drops_persisted_rows() {
        let store = SymbolStore::in_memory().unwrap();
        let mut entry = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        add_three(&mut entry);
        entry.serialize_all(Some(&store)).unwrap();

        entry.clear(Some(&store)).unwrap();
        assert_eq!(store.count_symbols().unwrap(), 0);
    }

    #[test]
    fn test_cold_cache_rehydrates_from_store() {
        let store = SymbolStore::in_memory().unwrap();
        let mut entry = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        add_three(&mut entry);
        entry.serialize_all(Some(&store)).unwrap();

        // A fresh entry for the same file has a cold cache
        let mut fresh = SymbolTableEntry::new(PathBuf::from("/src/a.pas"));
        let list = fresh.serialized_list(Some(&store)).unwrap();
        assert_eq!(list.decode().unwrap().len(), 3);
    }

    #[test]
    fn test_request_reload_without_store() {
        let entry = SymbolTableEntry::new(PathBuf::from("/nonexistent/a.pas"));
        assert!(entry.request_reload(None).unwrap());
        assert!(entry.request_reload(None).unwrap());
    }

    #[test]
    fn test_request_reload_with_store() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.pas");
        std::fs::write(&file, "unit a;").unwrap();

        let store = SymbolStore::in_memory().unwrap();
        let entry = SymbolTableEntry::new(file.clone());

        // First call records the mtime and asks for extraction
        assert!(entry.request_reload(Some(&store)).unwrap());
        // Unchanged file: skip
        assert!(!entry.request_reload(Some(&store)).unwrap());

        // Diverge the recorded timestamp to simulate an on-disk change
        store.touch_file(&file, 1).unwrap();
        assert!(entry.request_reload(Some(&store)).unwrap());
        // The passing call re-recorded the live mtime
        assert!(!entry.request_reload(Some(&store)).unwrap());
    }
}
