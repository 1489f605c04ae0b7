use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::app::Result;
use crate::domain::ProcessedSet;
use crate::store::Store;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// Oldest first
    links: Vec<String>,
}

/// Processed set kept in a single JSON file.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so an interrupted write leaves the previous
/// content in place.
pub struct JsonStore {
    path: PathBuf,
    capacity: usize,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> std::result::Result<ProcessedSet, String> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err("file not found".to_string());
            }
            Err(e) => return Err(e.to_string()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(ProcessedSet::new());
        }

        let file: StoreFile = serde_json::from_slice(&content).map_err(|e| e.to_string())?;
        if file.version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", file.version));
        }

        Ok(file.links.into_iter().collect())
    }
}

impl Store for JsonStore {
    fn load(&self) -> ProcessedSet {
        match self.read() {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    "Could not load processed entries from {} ({}); starting with an empty set, \
                     previously published entries may be published again",
                    self.path.display(),
                    e
                );
                ProcessedSet::new()
            }
        }
    }

    fn persist(&self, set: &ProcessedSet) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let file = StoreFile {
            version: FORMAT_VERSION,
            links: set.most_recent(self.capacity).map(String::from).collect(),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &file)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
