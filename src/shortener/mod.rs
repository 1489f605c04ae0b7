//! Optional URL shortening with fallback to the original link.

pub mod bitly;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::Result;

pub use bitly::BitlyShortener;

#[async_trait]
pub trait Shortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

/// Shorten `url`, or return it unchanged if no shortener is configured,
/// the call fails, or it doesn't finish within `timeout`.
pub async fn shorten_or_original(
    shortener: Option<&dyn Shortener>,
    url: &str,
    timeout: Duration,
) -> String {
    let Some(shortener) = shortener else {
        return url.to_string();
    };

    match tokio::time::timeout(timeout, shortener.shorten(url)).await {
        Ok(Ok(short)) if !short.trim().is_empty() => {
            debug!("Shortened {} to {}", url, short);
            short
        }
        Ok(Ok(_)) => {
            warn!("URL shortening returned an empty link for {}", url);
            url.to_string()
        }
        Ok(Err(e)) => {
            warn!("URL shortening failed for {}: {}", url, e);
            url.to_string()
        }
        Err(_) => {
            warn!("URL shortening timed out after {:?} for {}", timeout, url);
            url.to_string()
        }
    }
}
