//! Per-column metadata used to persist vectoriser state.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use strata_common::utils::error::{Error, Result};

/// Column name -> key -> value.
type Entries = BTreeMap<String, BTreeMap<String, JsonValue>>;

/// String-keyed metadata, scoped per column.
pub trait MetadataStore: Send + Sync {
    /// Returns the value stored under `key` for `column`.
    fn get(&self, column: &str, key: &str) -> Result<Option<JsonValue>>;

    /// Stores `value` under `key` for `column`.
    fn set(&self, column: &str, key: &str, value: JsonValue) -> Result<()>;

    /// Returns every key stored for `column`.
    fn keys(&self, column: &str) -> Result<Vec<String>>;
}

/// In-process metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<Entries>,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, column: &str, key: &str) -> Result<Option<JsonValue>> {
        Ok(self
            .entries
            .read()
            .get(column)
            .and_then(|keys| keys.get(key))
            .cloned())
    }

    fn set(&self, column: &str, key: &str, value: JsonValue) -> Result<()> {
        self.entries
            .write()
            .entry(column.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self, column: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .get(column)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Metadata store persisted as one JSON document.
///
/// The file is rewritten on every `set`, so state survives process
/// restarts.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl JsonMetadataStore {
    /// Opens the store at `path`, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)
                .map_err(|e| Error::Metadata(format!("{}: {e}", path.display())))?
        } else {
            Entries::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, entries)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    fn get(&self, column: &str, key: &str) -> Result<Option<JsonValue>> {
        Ok(self
            .entries
            .read()
            .get(column)
            .and_then(|keys| keys.get(key))
            .cloned())
    }

    fn set(&self, column: &str, key: &str, value: JsonValue) -> Result<()> {
        let mut entries = self.entries.write();
        entries
            .entry(column.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn keys(&self, column: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .get(column)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_scoped_by_column() {
        let store = MemoryMetadataStore::new();
        store.set("a", "width", json!(3)).unwrap();
        store.set("b", "width", json!(5)).unwrap();
        assert_eq!(store.get("a", "width").unwrap(), Some(json!(3)));
        assert_eq!(store.get("c", "width").unwrap(), None);
        assert_eq!(store.keys("b").unwrap(), vec!["width"]);
    }

    #[test]
    fn test_json_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        {
            let store = JsonMetadataStore::open(&path).unwrap();
            store.set("col", "labels", json!(["x", "y"])).unwrap();
        }
        let reopened = JsonMetadataStore::open(&path).unwrap();
        assert_eq!(reopened.get("col", "labels").unwrap(), Some(json!(["x", "y"])));
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonMetadataStore::open(&path), Err(Error::Metadata(_))));
    }
}
