//! # feedcast
//!
//! Polls an RSS/Atom feed and republishes new entries to a WordPress.com
//! blog or an Instagram business account, with a generated image per entry.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → Normalizer → Reader ─┐
//!                                ├→ new entries → Shortener → Transformer → Publisher
//! Store → ProcessedSet ──────────┘                                              │
//!          ↑                                                                    │
//!          └──────────────────────── record link on success ───────────────────┘
//! ```
//!
//! A link is added to the processed set only after the publish sequence
//! fully succeeded, and the set is persisted right after each success.
//!
//! ## Quick Start
//!
//! ```bash
//! # Authorize once (WordPress)
//! feedcast auth
//!
//! # Run one cycle
//! feedcast run --once
//!
//! # Poll until SIGINT/SIGTERM
//! feedcast run
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`config`]: TOML configuration
//! - [`domain`]: Feed entries and the processed set
//! - [`pipeline`]: One poll cycle
//! - [`publisher`]: Publish state machine and platform adapters

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together fetcher,
/// store, transformer, shortener and publisher from a [`Config`](config::Config).
pub mod app;

/// Configuration management.
///
/// Loads from `~/.config/feedcast/config.toml`, creating a commented
/// template on first run.
pub mod config;

/// Poll loop with PID-file guard and signal handling.
///
/// - `feedcast run` - Start polling
/// - `feedcast stop` - Stop the daemon
/// - `feedcast status` - Check if the daemon is running
pub mod daemon;

/// Command-line interface using clap.
pub mod cli;

/// Core domain models.
///
/// - [`FeedEntry`](domain::FeedEntry): One entry as read from the feed
/// - [`ProcessedSet`](domain::ProcessedSet): Insertion-ordered published links
pub mod domain;

/// HTTP fetching with conditional request support.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`FeedEntry`](domain::FeedEntry) values.
pub mod normalizer;

pub mod pipeline;

pub mod publisher;

/// Fetch + normalize with error containment.
pub mod reader;

/// Post body, caption and image generation.
pub mod render;

/// Optional Bitly link shortening.
pub mod shortener;

/// Durable processed-entry storage.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`JsonStore`](store::JsonStore): JSON file, replaced atomically
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
