//! Configuration management for feedcast.
//!
//! Configuration is read from `~/.config/feedcast/config.toml` at startup
//! (or the path given with `--config`). If the default file doesn't exist,
//! a commented template is created. Every section is optional; missing
//! fields fall back to their defaults.

pub mod interval;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub use interval::{format_interval, parse_interval};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub shortener: ShortenerConfig,
    pub render: RenderConfig,
    pub publisher: PublisherConfig,
    pub wordpress: WordPressConfig,
    pub instagram: InstagramConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// RSS/Atom feed to poll
    pub url: String,
    /// Delay between cycles, e.g. "10m", "1h", "300"
    pub poll_interval: String,
    /// Maximum successful publishes per cycle
    pub max_entries_per_cycle: usize,
    /// Run a cycle immediately on start instead of waiting one interval
    pub update_on_start: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval: "10m".to_string(),
            max_entries_per_cycle: 5,
            update_on_start: true,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval_secs(&self) -> Result<u64, ConfigError> {
        parse_interval(&self.poll_interval).map_err(ConfigError::Invalid)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Defaults to `<data dir>/feedcast/processed.json` (or `.db`)
    pub path: Option<PathBuf>,
    /// Number of most recent links kept on disk
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: None,
            capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShortenerConfig {
    /// Bitly generic access token; shortening is disabled without it
    pub bitly_token: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            bitly_token: None,
            api_base: "https://api-ssl.bitly.com/v4".to_string(),
            timeout_secs: 5,
        }
    }
}

impl ShortenerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Overrides the per-platform summary cap (500 for blogs, 200 for captions)
    pub summary_max_chars: Option<usize>,
    /// TrueType fonts tried in order before the built-in bitmap font
    pub font_paths: Vec<PathBuf>,
    pub caption_prefix: String,
    /// Draw random strokes over the background
    pub decorations: Option<bool>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            summary_max_chars: None,
            font_paths: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/Library/Fonts/Arial Bold.ttf"),
                PathBuf::from("C:\\Windows\\Fonts\\arialbd.ttf"),
            ],
            caption_prefix: "Breaking news: ".to_string(),
            decorations: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTarget {
    #[default]
    WordPress,
    Instagram,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub target: PublishTarget,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WordPressConfig {
    /// Site address, with or without scheme
    pub site: String,
    pub client_id: String,
    pub client_secret: String,
    /// Pre-issued bearer token; otherwise the token saved by `feedcast auth` is used
    pub access_token: Option<String>,
    pub api_base: String,
    pub oauth_base: String,
    pub redirect_port: u16,
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            site: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: None,
            api_base: "https://public-api.wordpress.com/rest/v1.1".to_string(),
            oauth_base: "https://public-api.wordpress.com/oauth2".to_string(),
            redirect_port: 8080,
        }
    }
}

impl WordPressConfig {
    /// Site host without scheme or trailing slash.
    pub fn site_host(&self) -> &str {
        self.site
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub user_id: String,
    pub access_token: Option<String>,
    pub imgur_client_id: String,
    pub graph_base: String,
    pub imgur_base: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            access_token: None,
            imgur_client_id: String::new(),
            graph_base: "https://graph.facebook.com/v16.0".to_string(),
            imgur_base: "https://api.imgur.com/3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. The default path is created with a
    /// commented template on first use.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default_path = Self::default_config_path()?;
                if !default_path.exists() {
                    Self::create_default_config(&default_path)?;
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/feedcast/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("feedcast").join("config.toml"))
    }

    /// Directory for the processed-entry store and the token cache.
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("feedcast"))
    }

    /// Check the settings the poll loop cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.url.trim().is_empty() {
            return Err(ConfigError::Invalid("feed.url is not set".into()));
        }
        url::Url::parse(&self.feed.url)
            .map_err(|e| ConfigError::Invalid(format!("feed.url: {}", e)))?;

        if self.feed.poll_interval_secs()? == 0 {
            return Err(ConfigError::Invalid("feed.poll_interval must be positive".into()));
        }
        if self.feed.max_entries_per_cycle == 0 {
            return Err(ConfigError::Invalid(
                "feed.max_entries_per_cycle must be at least 1".into(),
            ));
        }
        if self.store.capacity == 0 {
            return Err(ConfigError::Invalid("store.capacity must be at least 1".into()));
        }

        match self.publisher.target {
            PublishTarget::WordPress if self.wordpress.site_host().is_empty() => {
                Err(ConfigError::Invalid("wordpress.site is not set".into()))
            }
            PublishTarget::Instagram if self.instagram.user_id.is_empty() => {
                Err(ConfigError::Invalid("instagram.user_id is not set".into()))
            }
            _ => Ok(()),
        }
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# feedcast configuration
#
# Intervals accept "90s", "10m", "1h", "1d" or a number of seconds.

[feed]
# url = "https://example.com/feed.xml"
poll_interval = "10m"
max_entries_per_cycle = 5
update_on_start = true

[http]
timeout_secs = 30

[store]
# "json" (default) or "sqlite"
backend = "json"
# path = "/var/lib/feedcast/processed.json"
capacity = 1000

[shortener]
# bitly_token = "..."
timeout_secs = 5

[render]
# summary_max_chars = 300
caption_prefix = "Breaking news: "
font_paths = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
]

[publisher]
# "wordpress" or "instagram"
target = "wordpress"

[wordpress]
# site = "example.wordpress.com"
# client_id = "..."
# client_secret = "..."
# access_token = "..."
redirect_port = 8080

[instagram]
# user_id = "..."
# access_token = "..."
# imgur_client_id = "..."

[logging]
# file = "/var/log/feedcast.log"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
