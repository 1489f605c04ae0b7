use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};
use tracing::warn;

use crate::app::{FeedcastError, Result};
use crate::domain::ProcessedSet;
use crate::store::Store;

/// Processed set kept in a SQLite database, one row per link.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    capacity: usize,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.as_ref().to_path_buf()),
            capacity,
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open `path`, or move an unreadable database aside to
    /// `<path>.corrupt` and start from an empty one.
    pub fn open_or_recover<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        match Self::new(path, capacity) {
            Ok(store) => Ok(store),
            Err(e) => {
                let mut aside = path.as_os_str().to_owned();
                aside.push(".corrupt");
                let aside = PathBuf::from(aside);

                warn!(
                    "Could not open processed entries database {} ({}); moving it to {} and \
                     starting with an empty set, previously published entries may be published again",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(path, &aside)?;
                Self::new(path, capacity)
            }
        }
    }

    pub fn in_memory(capacity: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
            capacity,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FeedcastError::Other(format!("store lock poisoned: {}", e)))
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FeedcastError::Other(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn read(&self) -> Result<ProcessedSet> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT link FROM processed_entries ORDER BY seq")?;
        let links = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(links.into_iter().collect())
    }
}

impl Store for SqliteStore {
    fn load(&self) -> ProcessedSet {
        match self.read() {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    "Could not load processed entries from {} ({}); starting with an empty set, \
                     previously published entries may be published again",
                    self.location(),
                    e
                );
                ProcessedSet::new()
            }
        }
    }

    fn persist(&self, set: &ProcessedSet) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Keep the original timestamps of links that survive the rewrite
        let recorded: HashMap<String, String> = {
            let mut stmt = tx.prepare("SELECT link, recorded_at FROM processed_entries")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            rows
        };

        tx.execute("DELETE FROM processed_entries", [])?;
        {
            let now = Utc::now().to_rfc3339();
            let mut insert = tx.prepare(
                "INSERT INTO processed_entries (link, recorded_at) VALUES (?1, ?2)",
            )?;
            for link in set.most_recent(self.capacity) {
                let recorded_at = recorded.get(link).unwrap_or(&now);
                insert.execute(params![link, recorded_at])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(set: &ProcessedSet) -> Vec<String> {
        set.iter().map(String::from).collect()
    }

    #[test]
    fn test_empty_database_loads_empty() {
        let store = SqliteStore::in_memory(1000).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let store = SqliteStore::in_memory(1000).unwrap();
        let set: ProcessedSet = ["https://example.com/c", "https://example.com/a", "https://example.com/b"]
            .into_iter()
            .collect();

        store.persist(&set).unwrap();
        let loaded = store.load();
        assert_eq!(links(&loaded), links(&set));

        store.persist(&loaded).unwrap();
        assert_eq!(store.load(), set);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let store = SqliteStore::in_memory(2).unwrap();
        let set: ProcessedSet = ["a", "b", "c", "d"].into_iter().collect();
        store.persist(&set).unwrap();
        assert_eq!(links(&store.load()), vec!["c", "d"]);
    }

    #[test]
    fn test_recorded_at_survives_rewrite() {
        let store = SqliteStore::in_memory(10).unwrap();
        let mut set: ProcessedSet = ["a"].into_iter().collect();
        store.persist(&set).unwrap();

        let first: String = store
            .conn()
            .unwrap()
            .query_row(
                "SELECT recorded_at FROM processed_entries WHERE link = 'a'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        set.insert("b");
        store.persist(&set).unwrap();

        let second: String = store
            .conn()
            .unwrap()
            .query_row(
                "SELECT recorded_at FROM processed_entries WHERE link = 'a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");

        {
            let store = SqliteStore::new(&path, 10).unwrap();
            store.persist(&["x", "y"].into_iter().collect::<ProcessedSet>()).unwrap();
        }

        let store = SqliteStore::new(&path, 10).unwrap();
        assert_eq!(links(&store.load()), vec!["x", "y"]);
    }

    #[test]
    fn test_corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");
        fs::write(&path, b"definitely not a sqlite database, just some bytes").unwrap();

        assert!(SqliteStore::new(&path, 10).is_err());

        let store = SqliteStore::open_or_recover(&path, 10).unwrap();
        assert!(store.load().is_empty());
        assert_eq!(
            fs::read(dir.path().join("processed.db.corrupt")).unwrap(),
            b"definitely not a sqlite database, just some bytes"
        );

        store.persist(&["a"].into_iter().collect::<ProcessedSet>()).unwrap();
        assert_eq!(links(&store.load()), vec!["a"]);
    }

    #[test]
    fn test_healthy_database_not_moved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");
        SqliteStore::new(&path, 10)
            .unwrap()
            .persist(&["x"].into_iter().collect::<ProcessedSet>())
            .unwrap();

        let store = SqliteStore::open_or_recover(&path, 10).unwrap();
        assert_eq!(links(&store.load()), vec!["x"]);
        assert!(!dir.path().join("processed.db.corrupt").exists());
    }

    #[test]
    fn test_corrupt_database_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");
        let store = SqliteStore::new(&path, 10).unwrap();
        store.conn().unwrap().execute("DROP TABLE processed_entries", []).unwrap();
        assert!(store.load().is_empty());
    }
}
