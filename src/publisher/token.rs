use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::app::Result;
use crate::config::Config;

const TOKEN_FILE: &str = "wordpress_token.json";

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    obtained_at: DateTime<Utc>,
}

/// Bearer token saved by `feedcast auth` and read back by `feedcast run`.
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_data_dir() -> Result<Self> {
        Ok(Self::new(Config::data_dir()?.join(TOKEN_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached token, if one was saved and is readable.
    pub fn load(&self) -> Option<String> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<TokenFile>(&content) {
            Ok(file) if !file.access_token.is_empty() => Some(file.access_token),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring corrupt token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, token: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let file = TokenFile {
            access_token: token.to_string(),
            obtained_at: Utc::now(),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
