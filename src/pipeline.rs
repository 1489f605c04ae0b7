//! One poll cycle: fetch, diff against the processed set, then shorten,
//! render and publish each new entry.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::domain::{FeedEntry, ProcessedSet};
use crate::publisher::{PublishError, PublishResult, Publisher};
use crate::reader::FeedReader;
use crate::render::Transformer;
use crate::shortener::{shorten_or_original, Shortener};
use crate::store::Store;

pub const DEFAULT_MAX_PER_CYCLE: usize = 5;

/// Counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries returned by the feed
    pub fetched: usize,
    /// Entries not yet in the processed set
    pub new: usize,
    pub published: usize,
    pub failed: usize,
    /// Entries left for a later cycle or not publishable on this platform
    pub skipped: usize,
}

enum EntryOutcome {
    Published(PublishResult),
    Skipped,
}

pub struct Pipeline {
    reader: FeedReader,
    store: Box<dyn Store + Send + Sync>,
    processed: ProcessedSet,
    shortener: Option<Box<dyn Shortener>>,
    shortener_timeout: Duration,
    transformer: Transformer,
    publisher: Publisher,
    max_per_cycle: usize,
}

impl Pipeline {
    /// Build a pipeline and load the processed set from `store`.
    pub fn new(
        reader: FeedReader,
        store: Box<dyn Store + Send + Sync>,
        transformer: Transformer,
        publisher: Publisher,
    ) -> Self {
        let processed = store.load().with_limit(store.capacity());
        info!(
            "Loaded {} processed entries from {}",
            processed.len(),
            store.location()
        );

        Self {
            reader,
            store,
            processed,
            shortener: None,
            shortener_timeout: Duration::from_secs(5),
            transformer,
            publisher,
            max_per_cycle: DEFAULT_MAX_PER_CYCLE,
        }
    }

    pub fn with_shortener(mut self, shortener: Box<dyn Shortener>, timeout: Duration) -> Self {
        self.shortener = Some(shortener);
        self.shortener_timeout = timeout;
        self
    }

    pub fn with_max_per_cycle(mut self, max: usize) -> Self {
        self.max_per_cycle = max.max(1);
        self
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn feed_url(&self) -> &str {
        self.reader.url()
    }

    pub fn platform_name(&self) -> &str {
        self.publisher.platform_name()
    }

    /// Run one cycle. Never fails: per-entry errors and panics are logged
    /// and counted, and the entry stays unprocessed for the next cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let entries = self.reader.read().await;
        let mut report = CycleReport {
            fetched: entries.len(),
            ..CycleReport::default()
        };

        // Feeds sometimes repeat an item; only the first copy counts
        let mut seen = HashSet::new();
        let fresh: Vec<FeedEntry> = entries
            .into_iter()
            .filter(|e| !self.processed.contains(&e.link) && seen.insert(e.link.clone()))
            .collect();
        report.new = fresh.len();

        if fresh.is_empty() {
            debug!("No new entries in {}", self.reader.url());
            return report;
        }
        info!("{} new entries in {}", fresh.len(), self.reader.url());

        if !self.publisher.is_authenticated() {
            warn!(
                "No credential for {}; run `feedcast auth` or set an access token",
                self.publisher.platform_name()
            );
            report.skipped = fresh.len();
            return report;
        }

        for (index, entry) in fresh.iter().enumerate() {
            if report.published >= self.max_per_cycle {
                let remaining = fresh.len() - index;
                debug!("Cycle cap of {} reached, {} entries wait", self.max_per_cycle, remaining);
                report.skipped += remaining;
                break;
            }

            let outcome = AssertUnwindSafe(self.process_entry(entry))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(EntryOutcome::Published(result))) => {
                    report.published += 1;
                    info!(
                        "Published \"{}\" ({})",
                        entry.title,
                        result.external_id.as_deref().unwrap_or("no id")
                    );
                    self.record(&entry.link);
                }
                Ok(Ok(EntryOutcome::Skipped)) => report.skipped += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("Failed to publish {}: {}", entry.link, e);
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        "Unexpected failure while processing {}: {}",
                        entry.link,
                        panic_message(&*panic)
                    );
                }
            }
        }

        info!(
            "Cycle done: {} fetched, {} new, {} published, {} failed, {} skipped",
            report.fetched, report.new, report.published, report.failed, report.skipped
        );
        report
    }

    async fn process_entry(&self, entry: &FeedEntry) -> Result<EntryOutcome, PublishError> {
        let link =
            shorten_or_original(self.shortener.as_deref(), &entry.link, self.shortener_timeout)
                .await;
        let content = self.transformer.render(entry, &link);

        if content.image.is_none() && self.publisher.requires_image() {
            warn!(
                "Skipping {}: {} needs an image and none could be generated",
                entry.link,
                self.publisher.platform_name()
            );
            return Ok(EntryOutcome::Skipped);
        }

        self.publisher
            .publish(&content)
            .await
            .map(EntryOutcome::Published)
    }

    /// Add `link` and persist right away so a crash later in the cycle
    /// cannot cause a republish.
    fn record(&mut self, link: &str) {
        self.processed.insert(link);
        if let Err(e) = self.store.persist(&self.processed) {
            error!(
                "Failed to persist processed entries to {}: {}",
                self.store.location(),
                e
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic")
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::app::Result;
    use crate::publisher::tests::{FakePlatform, SharedPlatform};
    use crate::reader::tests::ScriptedFetcher;
    use crate::render::{BodyFormat, ImageLayout, ImageRenderer, TextFont};
    use crate::shortener::tests::{FailingShortener, FixedShortener};
    use crate::store::JsonStore;

    const FEED_URL: &str = "https://news.example.com/rss";

    fn item(n: u32) -> String {
        format!(
            "<item><title>Story {n}</title><link>https://news.example.com/{n}</link>\
             <description>Body of story {n}</description></item>"
        )
    }

    fn feed(items: &[String]) -> String {
        format!(
            "<rss version=\"2.0\"><channel><title>News</title>{}</channel></rss>",
            items.concat()
        )
    }

    fn small_layout() -> ImageLayout {
        ImageLayout {
            width: 240,
            height: 160,
            ..ImageLayout::blog()
        }
    }

    fn transformer(layout: ImageLayout) -> Transformer {
        Transformer::new(
            BodyFormat::Html,
            500,
            ImageRenderer::new(layout, TextFont::Builtin),
        )
    }

    struct Harness {
        fetcher: Arc<ScriptedFetcher>,
        platform: Arc<FakePlatform>,
        store_path: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(platform: FakePlatform) -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                fetcher: Arc::new(ScriptedFetcher::default()),
                platform: Arc::new(platform),
                store_path: dir.path().join("processed.json"),
                _dir: dir,
            }
        }

        fn pipeline(&self) -> Pipeline {
            self.pipeline_with(transformer(small_layout()))
        }

        fn pipeline_with(&self, transformer: Transformer) -> Pipeline {
            Pipeline::new(
                FeedReader::new(FEED_URL, self.fetcher.clone()),
                Box::new(JsonStore::new(&self.store_path, 1000)),
                transformer,
                Publisher::new(Box::new(SharedPlatform(self.platform.clone()))),
            )
        }

        fn serve(&self, body: &str) {
            self.fetcher.push_body(body, None);
        }

        fn publishes(&self) -> Vec<String> {
            self.platform
                .calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with("publish:"))
                .cloned()
                .collect()
        }

        fn persisted(&self) -> Vec<String> {
            persisted_links(&self.store_path)
        }
    }

    fn persisted_links(path: &Path) -> Vec<String> {
        JsonStore::new(path, 1000)
            .load()
            .iter()
            .map(String::from)
            .collect()
    }

    #[tokio::test]
    async fn test_second_cycle_publishes_nothing() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness.pipeline();
        let body = feed(&[item(1), item(2)]);

        harness.serve(&body);
        let first = pipeline.run_cycle().await;
        assert_eq!(first.published, 2);

        harness.serve(&body);
        let second = pipeline.run_cycle().await;
        assert_eq!(second.new, 0);
        assert_eq!(second.published, 0);
        assert_eq!(harness.publishes().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_link_published_once() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness.pipeline();

        harness.serve(&feed(&[item(1), item(2), item(1)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.new, 2);
        assert_eq!(report.published, 2);
        assert_eq!(harness.publishes().len(), 2);
        assert_eq!(
            harness.persisted(),
            vec!["https://news.example.com/1", "https://news.example.com/2"]
        );
    }

    #[tokio::test]
    async fn test_processed_set_bounded_by_store_capacity() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = Pipeline::new(
            FeedReader::new(FEED_URL, harness.fetcher.clone()),
            Box::new(JsonStore::new(&harness.store_path, 2)),
            transformer(small_layout()),
            Publisher::new(Box::new(SharedPlatform(harness.platform.clone()))),
        );

        harness.serve(&feed(&[item(1), item(2), item(3)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.published, 3);
        assert_eq!(pipeline.processed().len(), 2);
        assert!(!pipeline.processed().contains("https://news.example.com/1"));
        assert_eq!(
            harness.persisted(),
            vec!["https://news.example.com/2", "https://news.example.com/3"]
        );
    }

    #[tokio::test]
    async fn test_processed_entries_excluded_across_restart() {
        let harness = Harness::new(FakePlatform::default());

        harness.serve(&feed(&[item(1)]));
        harness.pipeline().run_cycle().await;

        // Same links in a different order, one added
        let mut restarted = harness.pipeline();
        harness.serve(&feed(&[item(2), item(1)]));
        let report = restarted.run_cycle().await;

        assert_eq!(report.fetched, 2);
        assert_eq!(report.new, 1);
        assert_eq!(
            harness.publishes(),
            vec!["publish:Story 1:Id(\"m-1\")", "publish:Story 2:Id(\"m-1\")"]
        );
        assert_eq!(
            harness.persisted(),
            vec!["https://news.example.com/1", "https://news.example.com/2"]
        );
    }

    #[tokio::test]
    async fn test_cap_limits_successful_publishes() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness.pipeline().with_max_per_cycle(2);
        let body = feed(&[item(1), item(2), item(3)]);

        harness.serve(&body);
        let report = pipeline.run_cycle().await;
        assert_eq!(report.published, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            harness.persisted(),
            vec!["https://news.example.com/1", "https://news.example.com/2"]
        );

        harness.serve(&body);
        let report = pipeline.run_cycle().await;
        assert_eq!(report.new, 1);
        assert_eq!(report.published, 1);
        assert_eq!(harness.persisted().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_recorded() {
        let harness = Harness::new(FakePlatform {
            fail_publish: true,
            ..FakePlatform::default()
        });
        let mut pipeline = harness.pipeline();

        harness.serve(&feed(&[item(1)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert!(pipeline.processed().is_empty());
        assert!(harness.persisted().is_empty());
        // Upload happened before the failed publish call
        assert_eq!(harness.platform.calls.lock().unwrap()[0], "upload");
    }

    #[tokio::test]
    async fn test_failed_entry_retried_next_cycle() {
        let harness = Harness::new(FakePlatform {
            fail_upload: true,
            ..FakePlatform::default()
        });
        let mut pipeline = harness.pipeline();
        let body = feed(&[item(1)]);

        harness.serve(&body);
        harness.serve(&body);
        assert_eq!(pipeline.run_cycle().await.failed, 1);

        let second = pipeline.run_cycle().await;
        assert_eq!(second.new, 1);
        assert_eq!(second.failed, 1);
    }

    #[tokio::test]
    async fn test_entry_without_summary_never_recorded() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness.pipeline();
        let bare = "<item><title>Bare</title><link>https://news.example.com/bare</link></item>";

        harness.serve(&feed(&[bare.to_string(), item(1)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.fetched, 1);
        assert_eq!(report.published, 1);
        assert!(!pipeline.processed().contains("https://news.example.com/bare"));
    }

    #[tokio::test]
    async fn test_unauthenticated_records_nothing() {
        let harness = Harness::new(FakePlatform {
            authenticated: false,
            ..FakePlatform::default()
        });
        let mut pipeline = harness.pipeline();

        harness.serve(&feed(&[item(1), item(2)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.skipped, 2);
        assert!(harness.platform.calls.lock().unwrap().is_empty());
        assert!(harness.persisted().is_empty());
    }

    #[tokio::test]
    async fn test_required_image_missing_skips_entry() {
        let harness = Harness::new(FakePlatform {
            requires_image: true,
            ..FakePlatform::default()
        });
        let broken = ImageLayout {
            height: 0,
            ..small_layout()
        };
        let mut pipeline = harness.pipeline_with(transformer(broken));

        harness.serve(&feed(&[item(1)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.skipped, 1);
        assert!(harness.platform.calls.lock().unwrap().is_empty());
        assert!(pipeline.processed().is_empty());
    }

    #[tokio::test]
    async fn test_shortened_link_in_body() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness
            .pipeline()
            .with_shortener(Box::new(FixedShortener("https://bit.ly/s1")), Duration::from_secs(1));

        harness.serve(&feed(&[item(1)]));
        let report = pipeline.run_cycle().await;
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn test_shortener_failure_still_publishes() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness
            .pipeline()
            .with_shortener(Box::new(FailingShortener), Duration::from_secs(1));

        harness.serve(&feed(&[item(1)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.published, 1);
        assert!(pipeline.processed().contains("https://news.example.com/1"));
    }

    struct PanickingShortener;

    #[async_trait]
    impl Shortener for PanickingShortener {
        async fn shorten(&self, url: &str) -> Result<String> {
            if url.ends_with("/1") {
                panic!("shortener blew up");
            }
            Ok(url.to_string())
        }
    }

    #[tokio::test]
    async fn test_panic_in_one_entry_does_not_stop_cycle() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness
            .pipeline()
            .with_shortener(Box::new(PanickingShortener), Duration::from_secs(1));

        harness.serve(&feed(&[item(1), item(2)]));
        let report = pipeline.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.published, 1);
        assert_eq!(harness.persisted(), vec!["https://news.example.com/2"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_empty_cycle() {
        let harness = Harness::new(FakePlatform::default());
        let mut pipeline = harness.pipeline();

        let report = pipeline.run_cycle().await;
        assert_eq!(report, CycleReport::default());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static msg");
        assert_eq!(panic_message(&*boxed), "static msg");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned msg"));
        assert_eq!(panic_message(&*boxed), "owned msg");
    }
}
