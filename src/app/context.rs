use std::sync::Arc;

use tracing::{debug, info};

use crate::app::error::{FeedcastError, Result};
use crate::config::{Config, PublishTarget};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::pipeline::Pipeline;
use crate::publisher::{InstagramPlatform, Platform, Publisher, TokenCache, WordPressPlatform};
use crate::reader::FeedReader;
use crate::render::Transformer;
use crate::shortener::{BitlyShortener, Shortener};
use crate::store::{open_store, Store};

/// Builds the components of a run from one [`Config`].
pub struct AppContext {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> =
            Arc::new(HttpFetcher::new(config.http.timeout())?);
        Ok(Self { config, fetcher })
    }

    pub fn store(&self) -> Result<Box<dyn Store + Send + Sync>> {
        open_store(&self.config.store)
    }

    /// Token from the config file, else the one saved by `feedcast auth`.
    pub fn wordpress_token(&self) -> Option<String> {
        let configured = self
            .config
            .wordpress
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty());
        if configured.is_some() {
            return configured;
        }

        let cache = TokenCache::in_data_dir().ok()?;
        let token = cache.load();
        if token.is_some() {
            debug!("Using WordPress token from {}", cache.path().display());
        }
        token
    }

    pub fn platform(&self) -> Result<Box<dyn Platform>> {
        let timeout = self.config.http.timeout();
        let platform: Box<dyn Platform> = match self.config.publisher.target {
            PublishTarget::WordPress => {
                if self.config.wordpress.site.trim().is_empty() {
                    return Err(FeedcastError::Other("wordpress.site is not set".into()));
                }
                Box::new(WordPressPlatform::new(
                    &self.config.wordpress,
                    self.wordpress_token(),
                    timeout,
                )?)
            }
            PublishTarget::Instagram => {
                if self.config.instagram.user_id.trim().is_empty() {
                    return Err(FeedcastError::Other("instagram.user_id is not set".into()));
                }
                Box::new(InstagramPlatform::new(&self.config.instagram, timeout)?)
            }
        };
        Ok(platform)
    }

    pub fn shortener(&self) -> Result<Option<Box<dyn Shortener>>> {
        let config = &self.config.shortener;
        let token = match config.bitly_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };
        let shortener: Box<dyn Shortener> = Box::new(BitlyShortener::new(
            config.api_base.as_str(),
            token,
            config.timeout(),
        )?);
        Ok(Some(shortener))
    }

    /// Validate the configuration and assemble the poll pipeline.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        self.config.validate()?;

        let reader = FeedReader::new(self.config.feed.url.as_str(), self.fetcher.clone());
        let transformer = Transformer::for_target(self.config.publisher.target, &self.config.render);
        let publisher = Publisher::new(self.platform()?);

        let mut pipeline = Pipeline::new(reader, self.store()?, transformer, publisher)
            .with_max_per_cycle(self.config.feed.max_entries_per_cycle);

        match self.shortener()? {
            Some(shortener) => {
                pipeline = pipeline.with_shortener(shortener, self.config.shortener.timeout());
            }
            None => info!("No Bitly token configured; links are posted unshortened"),
        }

        Ok(pipeline)
    }
}
