//! Feed reader: fetch + normalize, never failing the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::FeedEntry;
use crate::fetcher::{FetchResult, Fetcher};
use crate::normalizer::Normalizer;

pub struct FeedReader {
    url: String,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    etag: Option<String>,
    last_modified: Option<String>,
    // Served again on 304 so entries that failed to publish are retried.
    last_entries: Vec<FeedEntry>,
}

impl FeedReader {
    pub fn new(url: impl Into<String>, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self {
            url: url.into(),
            fetcher,
            normalizer: Normalizer::new(),
            etag: None,
            last_modified: None,
            last_entries: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read the feed's current full content.
    ///
    /// Network and parse failures are logged and produce an empty list.
    pub async fn read(&mut self) -> Vec<FeedEntry> {
        let result = self
            .fetcher
            .fetch(
                &self.url,
                self.etag.as_deref(),
                self.last_modified.as_deref(),
            )
            .await;

        match result {
            Ok(FetchResult::NotModified) => {
                debug!("Feed {} not modified", self.url);
                self.last_entries.clone()
            }
            Ok(FetchResult::Content {
                body,
                etag,
                last_modified,
            }) => match self.normalizer.normalize(&body) {
                Ok(entries) => {
                    self.etag = etag;
                    self.last_modified = last_modified;
                    self.last_entries = entries.clone();
                    entries
                }
                Err(e) => {
                    warn!("Failed to parse feed {}: {}", self.url, e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to fetch feed {}: {}", self.url, e);
                Vec::new()
            }
        }
    }
}
