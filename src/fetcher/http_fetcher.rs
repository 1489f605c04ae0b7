use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};

use crate::app::{FeedcastError, Result};
use crate::fetcher::{FetchResult, Fetcher};

/// Feeds larger than this are rejected.
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

pub const USER_AGENT: &str = concat!("feedcast/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult> {
        let mut headers = HeaderMap::new();

        if let Some(etag) = etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }

        if let Some(last_modified) = last_modified {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        let response = self.client.get(url).headers(headers).send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified);
        }

        response.error_for_status_ref()?;

        if let Some(length) = response.content_length() {
            if length > MAX_FEED_SIZE {
                return Err(FeedcastError::FeedParse(format!(
                    "feed too large: {} bytes (max {})",
                    length, MAX_FEED_SIZE
                )));
            }
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response.bytes().await?.to_vec();
        if body.len() as u64 > MAX_FEED_SIZE {
            return Err(FeedcastError::FeedParse(format!(
                "feed too large: {} bytes (max {})",
                body.len(),
                MAX_FEED_SIZE
            )));
        }

        Ok(FetchResult::Content {
            body,
            etag,
            last_modified,
        })
    }
}
