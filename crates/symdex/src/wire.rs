//! Wire-format assembly for serialized symbol collections.
//!
//! Individual records serialize themselves (see [`crate::SymbolRecord`]);
//! this module glues those cached wire forms into flat JSON-array
//! collections without ever re-parsing element text. Both the per-entry
//! cached list and every query result use this shape.

use crate::{Result, SymbolRecord};

/// A serialized, flat collection of symbol records: a JSON array whose
/// elements are the records' cached wire forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedSymbols(String);

impl Default for SerializedSymbols {
    fn default() -> Self {
        Self::empty()
    }
}

impl SerializedSymbols {
    pub fn empty() -> Self {
        Self("[]".to_string())
    }

    /// Assemble a collection from individual record wire forms.
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::from("[");
        for record in records {
            if out.len() > 1 {
                out.push(',');
            }
            out.push_str(record.as_ref());
        }
        out.push(']');
        Self(out)
    }

    /// Merge several collections into one, skipping empty parts.
    pub fn concat<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a SerializedSymbols>,
    {
        let mut out = String::from("[");
        for part in parts {
            let inner = part.inner();
            if inner.is_empty() {
                continue;
            }
            if out.len() > 1 {
                out.push(',');
            }
            out.push_str(inner);
        }
        out.push(']');
        Self(out)
    }

    /// The element text between the array brackets.
    fn inner(&self) -> &str {
        self.0.get(1..self.0.len().saturating_sub(1)).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.inner().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Decode back into records. Query consumers that need structured data
    /// (and the tests) use this; the hot path stays string-only.
    pub fn decode(&self) -> Result<Vec<SymbolRecord>> {
        Ok(serde_json::from_str(&self.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Location, SymbolKind};
    use std::path::PathBuf;

    fn wire(name: &str) -> String {
        let mut record = SymbolRecord::new(
            name.to_string(),
            SymbolKind::Constant,
            Location::new(PathBuf::from("consts.pas"), 1, 2, name.len() as u32),
        );
        record.serialize().unwrap().to_string()
    }

    #[test]
    fn test_empty() {
        let list = SerializedSymbols::empty();
        assert!(list.is_empty());
        assert_eq!(list.as_str(), "[]");
        assert!(list.decode().unwrap().is_empty());
    }

    #[test]
    fn test_from_records() {
        let list = SerializedSymbols::from_records([wire("Alpha"), wire("Beta")]);
        let records = list.decode().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Alpha");
        assert_eq!(records[1].name, "Beta");
    }

    #[test]
    fn test_concat_skips_empty_parts() {
        let a = SerializedSymbols::from_records([wire("Alpha")]);
        let b = SerializedSymbols::empty();
        let c = SerializedSymbols::from_records([wire("Gamma")]);

        let merged = SerializedSymbols::concat([&a, &b, &c]);
        let names: Vec<String> = merged
            .decode()
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Alpha", "Gamma"]);
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let merged = SerializedSymbols::concat(Vec::<&SerializedSymbols>::new());
        assert!(merged.is_empty());
    }
}
