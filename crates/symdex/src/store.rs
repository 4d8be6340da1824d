//! SQLite-backed persistent symbol store.
//!
//! The store is an optional second cache tier: a durable mapping from file
//! path to (last-indexed mtime, per-symbol serialized records). It makes two
//! things cheap across server restarts: deciding whether a file needs
//! re-extraction, and substring search over every indexed symbol name.
//!
//! Rows in `symbols` carry no uniqueness constraint; staleness is prevented
//! by clear-then-bulk-insert per file, never by merging or diffing.
//!
//! Every operation returns a `Result`. A failing store is never fatal here;
//! the manager reacts by degrading to in-memory-only operation.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rusqlite::{params, Connection, OptionalExtension};

use crate::wire::SerializedSymbols;
use crate::{IndexError, Result};

/// Current schema version. Rows are not versioned; breaking schema changes
/// require a fresh store file.
pub const SCHEMA_VERSION: u32 = 1;

/// Rows inserted per statement batch, bounding single-transaction cost.
pub const INSERT_BATCH_SIZE: usize = 1000;

/// Default store filename within a workspace cache directory.
pub const DEFAULT_STORE_NAME: &str = "symbols.db";

/// A row ready for insertion: symbol name, owning file, serialized record.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub name: String,
    pub path: PathBuf,
    pub serialized: String,
}

/// Durable path-keyed symbol cache backed by SQLite.
pub struct SymbolStore {
    conn: Connection,
}

impl SymbolStore {
    /// Open the store at `path`, creating file, parent directories, and
    /// schema on first use. Fails on an incompatible schema version.
    pub fn open(path: &Path) -> Result<Self> {
        let existed = path.exists();
        if !existed {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init(existed)?;
        Ok(store)
    }

    /// An in-memory store, useful for tests and throwaway sessions.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init(false)?;
        Ok(store)
    }

    fn init(&self, existed: bool) -> Result<()> {
        // WAL with NORMAL sync: good write throughput at reload time without
        // risking the source of truth (the store is only a cache).
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        self.conn.execute_batch(SCHEMA_SQL)?;

        if existed {
            let version = self.get_schema_version()?;
            if version != SCHEMA_VERSION {
                return Err(IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "store schema version {} does not match supported version {}; delete the store file to rebuild",
                        version, SCHEMA_VERSION
                    ),
                )));
            }
        } else {
            self.set_metadata("schema_version", &SCHEMA_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Get the schema version from metadata. 0 means none was recorded.
    pub fn get_schema_version(&self) -> Result<u32> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            Some(v) => v.parse().map_err(|_| {
                IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid schema version",
                ))
            }),
            None => Ok(0),
        }
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // =========================================================================
    // File entries (mtime tracking)
    // =========================================================================

    /// Upsert the recorded modification time for a path.
    pub fn touch_file(&self, path: &Path, mtime: u64) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.conn.execute(
            "INSERT OR REPLACE INTO entries (path, mtime) VALUES (?1, ?2)",
            params![path_str.as_ref(), mtime as i64],
        )?;
        Ok(())
    }

    /// Whether a timestamp is recorded for `path`.
    pub fn has_file(&self, path: &Path) -> Result<bool> {
        Ok(self.recorded_mtime(path)?.is_some())
    }

    /// The recorded modification time for `path`, if any.
    pub fn recorded_mtime(&self, path: &Path) -> Result<Option<u64>> {
        let path_str = path.to_string_lossy();
        let mtime: Option<i64> = self
            .conn
            .query_row(
                "SELECT mtime FROM entries WHERE path = ?1",
                params![path_str.as_ref()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mtime.map(|m| m as u64))
    }

    /// True iff a timestamp is recorded for `path` and differs from the live
    /// filesystem modification time.
    pub fn file_modified(&self, path: &Path) -> Result<bool> {
        let Some(recorded) = self.recorded_mtime(path)? else {
            return Ok(false);
        };
        Ok(disk_mtime(path)? != recorded)
    }

    /// Drop the entry row and all symbol rows for a path.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.conn.execute(
            "DELETE FROM entries WHERE path = ?1",
            params![path_str.as_ref()],
        )?;
        self.clear_symbols(path)?;
        Ok(())
    }

    /// All paths with a recorded timestamp.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM entries ORDER BY path")?;
        let files = stmt
            .query_map([], |row| {
                let path: String = row.get(0)?;
                Ok(PathBuf::from(path))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // =========================================================================
    // Symbol rows
    // =========================================================================

    /// Delete all symbol rows for a path. Always called before re-insertion.
    pub fn clear_symbols(&self, path: &Path) -> Result<usize> {
        let path_str = path.to_string_lossy();
        let count = self.conn.execute(
            "DELETE FROM symbols WHERE path = ?1",
            params![path_str.as_ref()],
        )?;
        Ok(count)
    }

    /// Insert a single symbol row.
    pub fn insert_symbol(&self, row: &SymbolRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO symbols (name, path, serialized) VALUES (?1, ?2, ?3)",
            params![row.name, row.path.to_string_lossy(), row.serialized],
        )?;
        Ok(())
    }

    /// Bulk-insert symbol rows, one transaction per batch of
    /// [`INSERT_BATCH_SIZE`] rows.
    pub fn insert_symbols(&self, rows: &[SymbolRow]) -> Result<()> {
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let tx = self.conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO symbols (name, path, serialized) VALUES (?1, ?2, ?3)",
                )?;
                for row in chunk {
                    stmt.execute(params![
                        row.name,
                        row.path.to_string_lossy(),
                        row.serialized
                    ])?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// All rows whose path contains `path_substring`, as one serialized
    /// collection. The per-document rehydrate path passes the exact file
    /// path here.
    pub fn find_all_symbols(&self, path_substring: &str) -> Result<SerializedSymbols> {
        self.query_serialized(
            "SELECT serialized FROM symbols WHERE path LIKE ?1 ORDER BY id",
            path_substring,
        )
    }

    /// All rows whose name contains `name_substring`; the empty string
    /// matches every row. This is the workspace search backend.
    pub fn find_symbols(&self, name_substring: &str) -> Result<SerializedSymbols> {
        self.query_serialized(
            "SELECT serialized FROM symbols WHERE name LIKE ?1 ORDER BY id",
            name_substring,
        )
    }

    fn query_serialized(&self, sql: &str, substring: &str) -> Result<SerializedSymbols> {
        let pattern = format!("%{}%", substring);
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(SerializedSymbols::from_records(rows))
    }

    /// Total symbol rows in the store.
    pub fn count_symbols(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Live filesystem mtime in whole seconds since the epoch.
pub(crate) fn disk_mtime(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

// ============================================================================
// Schema SQL
// ============================================================================

const SCHEMA_SQL: &str = r#"
-- Metadata table for versioning
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Last-indexed modification time per file
CREATE TABLE IF NOT EXISTS entries (
    path TEXT PRIMARY KEY,
    mtime INTEGER NOT NULL
);

-- Serialized symbol records, append-only between per-file clears
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    serialized TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_path ON symbols(path);
"#;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(name: &str, path: &str) -> SymbolRow {
        let mut record = crate::SymbolRecord::new(
            name.to_string(),
            crate::SymbolKind::Constant,
            crate::Location::new(PathBuf::from(path), 0, 0, name.len() as u32),
        );
        let serialized = record.serialize().unwrap().to_string();
        SymbolRow {
            name: name.to_string(),
            path: PathBuf::from(path),
            serialized,
        }
    }

    #[test]
    fn test_in_memory_store_has_current_schema() {
        let store = SymbolStore::in_memory().unwrap();
        assert_eq!(store.get_schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.count_symbols().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_and_reopens() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("cache/symbols.db");

        let store = SymbolStore::open(&db_path).unwrap();
        store.insert_symbol(&make_row("Alpha", "/src/a.pas")).unwrap();
        drop(store);

        let store = SymbolStore::open(&db_path).unwrap();
        assert_eq!(store.get_schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.count_symbols().unwrap(), 1);
    }

    #[test]
    fn test_touch_and_recorded_mtime() {
        let store = SymbolStore::in_memory().unwrap();
        let path = Path::new("/src/a.pas");

        assert!(!store.has_file(path).unwrap());
        store.touch_file(path, 1700000000).unwrap();
        assert!(store.has_file(path).unwrap());
        assert_eq!(store.recorded_mtime(path).unwrap(), Some(1700000000));

        // Upsert replaces
        store.touch_file(path, 1700000999).unwrap();
        assert_eq!(store.recorded_mtime(path).unwrap(), Some(1700000999));
    }

    #[test]
    fn test_file_modified_against_disk() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.pas");
        std::fs::write(&file, "unit a;").unwrap();
        let store = SymbolStore::in_memory().unwrap();

        // No recorded timestamp: not "modified"
        assert!(!store.file_modified(&file).unwrap());

        store.touch_file(&file, disk_mtime(&file).unwrap()).unwrap();
        assert!(!store.file_modified(&file).unwrap());

        // A diverging recorded timestamp reads as modified
        store.touch_file(&file, 1).unwrap();
        assert!(store.file_modified(&file).unwrap());
    }

    #[test]
    fn test_clear_then_insert_leaves_no_stale_rows() {
        let store = SymbolStore::in_memory().unwrap();
        let path = Path::new("/src/a.pas");

        store
            .insert_symbols(&[make_row("Old", "/src/a.pas"), make_row("Older", "/src/a.pas")])
            .unwrap();
        store.insert_symbol(&make_row("Kept", "/src/b.pas")).unwrap();

        let removed = store.clear_symbols(path).unwrap();
        assert_eq!(removed, 2);
        store.insert_symbol(&make_row("New", "/src/a.pas")).unwrap();

        let names: Vec<String> = store
            .find_all_symbols("/src/a.pas")
            .unwrap()
            .decode()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["New"]);
        assert_eq!(store.count_symbols().unwrap(), 2);
    }

    #[test]
    fn test_find_symbols_substring() {
        let store = SymbolStore::in_memory().unwrap();
        store
            .insert_symbols(&[
                make_row("Alpha", "/src/a.pas"),
                make_row("Beta", "/src/a.pas"),
                make_row("Gamma", "/src/b.pas"),
            ])
            .unwrap();

        let names = |query: &str| -> Vec<String> {
            store
                .find_symbols(query)
                .unwrap()
                .decode()
                .unwrap()
                .into_iter()
                .map(|r| r.name)
                .collect()
        };

        assert_eq!(names("a"), ["Alpha", "Beta", "Gamma"]);
        assert_eq!(names("Be"), ["Beta"]);
        assert_eq!(names(""), ["Alpha", "Beta", "Gamma"]);
        assert!(names("zeta").is_empty());
    }

    #[test]
    fn test_find_all_symbols_by_path() {
        let store = SymbolStore::in_memory().unwrap();
        store
            .insert_symbols(&[
                make_row("Alpha", "/src/a.pas"),
                make_row("Beta", "/src/b.pas"),
            ])
            .unwrap();

        let rows = store.find_all_symbols("/src/b.pas").unwrap();
        let records = rows.decode().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Beta");
    }

    #[test]
    fn test_insert_symbols_batches() {
        let store = SymbolStore::in_memory().unwrap();
        let rows: Vec<SymbolRow> = (0..2500)
            .map(|i| make_row(&format!("Sym{}", i), "/src/big.pas"))
            .collect();
        store.insert_symbols(&rows).unwrap();
        assert_eq!(store.count_symbols().unwrap(), 2500);
    }

    #[test]
    fn test_remove_file() {
        let store = SymbolStore::in_memory().unwrap();
        let path = Path::new("/src/a.pas");
        store.touch_file(path, 42).unwrap();
        store.insert_symbol(&make_row("Alpha", "/src/a.pas")).unwrap();

        store.remove_file(path).unwrap();
        assert!(!store.has_file(path).unwrap());
        assert_eq!(store.count_symbols().unwrap(), 0);
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_list_files() {
        let store = SymbolStore::in_memory().unwrap();
        store.touch_file(Path::new("/src/b.pas"), 2).unwrap();
        store.touch_file(Path::new("/src/a.pas"), 1).unwrap();
        assert_eq!(
            store.list_files().unwrap(),
            [PathBuf::from("/src/a.pas"), PathBuf::from("/src/b.pas")]
        );
    }
}
