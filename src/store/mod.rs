pub mod json;
pub mod sqlite;

use std::path::PathBuf;

use crate::app::Result;
use crate::config::{Config, StoreBackend, StoreConfig};
use crate::domain::ProcessedSet;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Durable record of published links.
pub trait Store {
    /// Read the persisted set. Any failure yields an empty set and a
    /// warning; it never fails the process.
    fn load(&self) -> ProcessedSet;

    /// Replace the persisted content with the most recent `capacity()`
    /// links of `set`.
    fn persist(&self, set: &ProcessedSet) -> Result<()>;

    fn capacity(&self) -> usize;

    /// Human-readable location, for logs and `feedcast status`.
    fn location(&self) -> String;
}

/// Open the backend selected in the configuration.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn Store + Send + Sync>> {
    let path = match &config.path {
        Some(p) => p.clone(),
        None => default_store_path(config.backend)?,
    };

    let store: Box<dyn Store + Send + Sync> = match config.backend {
        StoreBackend::Json => Box::new(JsonStore::new(path, config.capacity)),
        StoreBackend::Sqlite => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(SqliteStore::open_or_recover(path, config.capacity)?)
        }
    };

    Ok(store)
}

fn default_store_path(backend: StoreBackend) -> Result<PathBuf> {
    let dir = Config::data_dir()?;
    let file = match backend {
        StoreBackend::Json => "processed.json",
        StoreBackend::Sqlite => "processed.db",
    };
    Ok(dir.join(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();

        let json = open_store(&StoreConfig {
            backend: StoreBackend::Json,
            path: Some(dir.path().join("state.json")),
            capacity: 10,
        })
        .unwrap();
        assert!(json.location().ends_with("state.json"));

        let sqlite = open_store(&StoreConfig {
            backend: StoreBackend::Sqlite,
            path: Some(dir.path().join("nested").join("state.db")),
            capacity: 10,
        })
        .unwrap();
        assert!(sqlite.location().ends_with("state.db"));
        assert_eq!(sqlite.capacity(), 10);
    }

    #[test]
    fn test_open_store_survives_corrupt_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef].repeat(64)).unwrap();

        let store = open_store(&StoreConfig {
            backend: StoreBackend::Sqlite,
            path: Some(path),
            capacity: 10,
        })
        .unwrap();
        assert!(store.load().is_empty());
        assert!(dir.path().join("processed.db.corrupt").exists());
    }
}
