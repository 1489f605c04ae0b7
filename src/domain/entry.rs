use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item read from the feed, identified by its canonical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedEntry {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            link: link.into(),
            published_at: None,
        }
    }
}
