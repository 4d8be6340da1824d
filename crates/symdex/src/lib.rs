//! symdex: symbol extraction, per-file caching, and persistent search
//!
//! This crate provides the indexing core of a language-tooling server:
//! - Symbol extraction from parsed source trees (the parser itself is an
//!   external collaborator, see [`tree::SourceParser`])
//! - A per-file symbol table with lazily-computed serialized caches
//! - An optional SQLite store for substring search and cheap invalidation
//! - A manager that unifies both tiers to answer document and workspace
//!   symbol queries

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod entry;
pub mod extract;
pub mod manager;
pub mod scan;
pub mod store;
pub mod tree;
pub mod wire;

// Re-export main types
pub use config::Config;
pub use entry::SymbolTableEntry;
pub use extract::{read_identifier, Extractor, IdentOptions};
pub use manager::SymbolManager;
pub use scan::{CancelToken, ScanStats};
pub use store::SymbolStore;
pub use tree::{NodeKind, SourceParser, SourcePos, SourceTree, SyntaxNode};
pub use wire::SerializedSymbols;

/// Where a symbol lives: file, 0-based line and column, and the length of
/// the identifier span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub length: u32,
}

impl Location {
    pub fn new(file: PathBuf, line: u32, column: u32, length: u32) -> Self {
        Self {
            file,
            line,
            column,
            length,
        }
    }
}

/// The kind of symbol surfaced to the dispatcher. Closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Orthogonal symbol markers. Omitted from the wire form when empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFlags {
    /// Declaration with no body (terminator right after the external marker).
    #[serde(default)]
    pub forward: bool,
}

impl SymbolFlags {
    pub fn is_empty(&self) -> bool {
        !self.forward
    }
}

/// A single named, located, classified program entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Display identifier (may be synthesized, e.g. section markers).
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    /// Qualifying name, e.g. the enclosing type for a method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "SymbolFlags::is_empty")]
    pub flags: SymbolFlags,
    /// Cached wire form. Either `None` or exactly the serialization of the
    /// current field values; cleared whenever the owning list is cleared.
    #[serde(skip)]
    pub serialized: Option<String>,
}

impl SymbolRecord {
    pub fn new(name: String, kind: SymbolKind, location: Location) -> Self {
        Self {
            name,
            kind,
            location,
            container_name: None,
            flags: SymbolFlags::default(),
            serialized: None,
        }
    }

    /// Produce (and cache) the wire form of this record.
    pub fn serialize(&mut self) -> Result<&str> {
        if self.serialized.is_none() {
            self.serialized = Some(serde_json::to_string(self)?);
        }
        Ok(self.serialized.as_deref().unwrap_or_default())
    }
}

/// Errors that can occur while indexing.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse file: {}", .path.display())]
    Parse { path: PathBuf },

    #[error("symbol store error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to serialize symbols: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_creation() {
        let loc = Location::new(PathBuf::from("geometry.pas"), 12, 4, 6);
        assert_eq!(loc.line, 12);
        assert_eq!(loc.column, 4);
        assert_eq!(loc.length, 6);
    }

    #[test]
    fn test_symbol_kind_display() {
        assert_eq!(format!("{}", SymbolKind::Class), "Class");
        assert_eq!(format!("{}", SymbolKind::TypeParameter), "TypeParameter");
    }

    #[test]
    fn test_record_serialize_caches() {
        let mut record = SymbolRecord::new(
            "TPoint".to_string(),
            SymbolKind::Struct,
            Location::new(PathBuf::from("geometry.pas"), 3, 2, 6),
        );
        assert!(record.serialized.is_none());

        let wire = record.serialize().unwrap().to_string();
        assert_eq!(record.serialized.as_deref(), Some(wire.as_str()));
        // A second call reuses the cache
        assert_eq!(record.serialize().unwrap(), wire);
    }

    #[test]
    fn test_empty_flags_and_container_omitted() {
        let mut record = SymbolRecord::new(
            "Render".to_string(),
            SymbolKind::Method,
            Location::new(PathBuf::from("widgets.pas"), 8, 2, 6),
        );
        let wire = record.serialize().unwrap();
        assert!(!wire.contains("flags"));
        assert!(!wire.contains("container_name"));
    }

    #[test]
    fn test_forward_flag_serialized() {
        let mut record = SymbolRecord::new(
            "TWidget".to_string(),
            SymbolKind::Class,
            Location::new(PathBuf::from("widgets.pas"), 1, 2, 7),
        );
        record.flags.forward = true;
        let wire = record.serialize().unwrap();
        assert!(wire.contains(r#""forward":true"#));
    }

    #[test]
    fn test_record_roundtrip() {
        let mut record = SymbolRecord::new(
            "Clamp".to_string(),
            SymbolKind::Function,
            Location::new(PathBuf::from("mathutil.pas"), 20, 9, 5),
        );
        record.container_name = Some("TRange".to_string());
        let wire = record.serialize().unwrap().to_string();

        let back: SymbolRecord = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.name, "Clamp");
        assert_eq!(back.kind, SymbolKind::Function);
        assert_eq!(back.container_name.as_deref(), Some("TRange"));
        assert!(back.serialized.is_none());
    }
}
