use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FeedcastError, Result};
use crate::domain::FeedEntry;

const UNTITLED: &str = "(Untitled)";

#[derive(Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse RSS, Atom or JSON Feed content into entries, in feed order.
    ///
    /// Entries without a link, or without any summary/description text,
    /// are dropped: the link is the entry's identity and the text is what
    /// gets published.
    pub fn normalize(&self, body: &[u8]) -> Result<Vec<FeedEntry>> {
        let feed = parser::parse(body).map_err(|e| FeedcastError::FeedParse(e.to_string()))?;

        let entries = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let link = entry.links.first().map(|l| l.href.trim().to_string())?;
                if link.is_empty() {
                    return None;
                }

                let summary = entry
                    .summary
                    .map(|s| s.content)
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .filter(|s| !s.trim().is_empty());

                let Some(summary) = summary else {
                    tracing::debug!("Skipping entry without summary or description: {}", link);
                    return None;
                };

                let title = entry
                    .title
                    .map(|t| decode_html_entities(t.content.trim()).to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string());

                Some(FeedEntry {
                    title,
                    summary,
                    link,
                    published_at: entry.published.or(entry.updated),
                })
            })
            .collect();

        Ok(entries)
    }
}
