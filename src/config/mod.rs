//! Configuration management for freshet.
//!
//! Settings are read from `~/.config/freshet/config.toml`. If the file doesn't
//! exist, a default configuration with comments is created. The pipeline
//! re-reads settings through a [`SettingsProvider`] at the start of every run,
//! so edits take effect without a restart.

pub mod schedule;

pub use schedule::Schedule;

use crate::distribution::Strategy;
use crate::domain::{ArticleStatus, Source};
use crate::scraper::ScraperConfig;
use rand::Rng;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Main settings struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub parser: ParserSettings,
    pub publishing: PublishingSettings,
    pub content: ContentSettings,
    pub initial_stats: InitialStatsSettings,
    pub scraper: ScraperConfig,
    pub sources: Vec<Source>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parser: ParserSettings::default(),
            publishing: PublishingSettings::default(),
            content: ContentSettings::default(),
            initial_stats: InitialStatsSettings::default(),
            scraper: ScraperConfig::default(),
            sources: Source::defaults(),
        }
    }
}

/// Scheduling and request pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub enabled: bool,
    pub schedule: Schedule,
    pub articles_per_run: usize,
    /// Feed mode when true, listing-page crawl otherwise.
    pub use_feed_mode: bool,
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub iteration_delay_ms: u64,
    pub listing_delay_ms: u64,
    pub feed_workers: usize,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: Schedule::default(),
            articles_per_run: 5,
            use_feed_mode: true,
            request_delay_ms: 2000,
            request_timeout_secs: 30,
            iteration_delay_ms: 2000,
            listing_delay_ms: 1500,
            feed_workers: 10,
        }
    }
}

impl ParserSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }

    pub fn listing_delay(&self) -> Duration {
        Duration::from_millis(self.listing_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DomainWeight {
    pub domain_id: i64,
    pub weight: u32,
}

/// Where and how accepted articles are published.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingSettings {
    /// Target domain ids. Empty means every active domain.
    pub domain_ids: Vec<i64>,
    pub strategy: Strategy,
    pub weights: Vec<DomainWeight>,
    pub author_id: Option<i64>,
    pub category: String,
    /// Status for page-mode articles. Feed-mode articles are always published.
    pub default_status: ArticleStatus,
    /// Used when an extraction yields no tags.
    pub default_tags: Vec<String>,
}

impl Default for PublishingSettings {
    fn default() -> Self {
        Self {
            domain_ids: Vec::new(),
            strategy: Strategy::default(),
            weights: Vec::new(),
            author_id: None,
            category: "Crypto".to_string(),
            default_status: ArticleStatus::Draft,
            default_tags: vec!["crypto".to_string(), "news".to_string()],
        }
    }
}

impl PublishingSettings {
    /// Configured weight for a domain, 1 when unset.
    pub fn weight_for(&self, domain_id: i64) -> u32 {
        self.weights
            .iter()
            .find(|w| w.domain_id == domain_id)
            .map(|w| w.weight)
            .unwrap_or(1)
    }
}

/// Extraction thresholds and image handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub min_content_length: usize,
    pub excerpt_length: usize,
    pub save_images: bool,
    pub image_dir: PathBuf,
    pub image_url_prefix: String,
    pub max_image_size: u64,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            min_content_length: 500,
            excerpt_length: 200,
            save_images: true,
            image_dir: default_image_dir(),
            image_url_prefix: "/uploads/parsed-images".to_string(),
            max_image_size: 5 * 1024 * 1024,
        }
    }
}

fn default_image_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("freshet").join("parsed-images"))
        .unwrap_or_else(|| PathBuf::from("parsed-images"))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatRange {
    pub min: u32,
    pub max: u32,
}

impl StatRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Uniform pick in `[min, max]`. A collapsed or inverted range yields `min`.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

/// Starting counters for newly created articles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitialStatsSettings {
    pub views: StatRange,
    pub likes: StatRange,
}

impl Settings {
    /// Load settings from the default path.
    ///
    /// If the file doesn't exist, creates a default one with comments.
    /// Missing fields use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Get the default config file path: `~/.config/freshet/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("freshet").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.parser.articles_per_run) {
            return Err(ConfigError::Invalid(format!(
                "parser.articles_per_run must be between 1 and 50, got {}",
                self.parser.articles_per_run
            )));
        }
        if self.parser.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "parser.request_timeout_secs must be positive".into(),
            ));
        }
        if self.parser.feed_workers == 0 {
            return Err(ConfigError::Invalid(
                "parser.feed_workers must be positive".into(),
            ));
        }
        if self.sources.iter().any(|s| s.fetch_url.trim().is_empty()) {
            return Err(ConfigError::Invalid("every source needs a fetch_url".into()));
        }
        Ok(())
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
        r##"# freshet configuration
#
# Sources default to the built-in crypto news registry. To override, add
# [[sources]] tables:
#
# [[sources]]
# name = "Decrypt"
# fetch_url = "https://decrypt.co/feed"
# base_url = "https://decrypt.co"
# weight = 3
# mode = "feed"        # "feed" or "page"

[parser]
enabled = true

# One of: 15min, 30min, 1h, 2h, 4h, 8h, 12h, 24h
schedule = "4h"

# New articles wanted per run (1-50)
articles_per_run = 5

# Read RSS/Atom feeds when true, crawl listing pages otherwise
use_feed_mode = true

# Pause between article requests (milliseconds)
request_delay_ms = 2000

# Per-request timeout (seconds)
request_timeout_secs = 30

# Pause between search iterations and listing pages (milliseconds)
iteration_delay_ms = 2000
listing_delay_ms = 1500

# Feeds fetched concurrently
feed_workers = 10

[publishing]
# Empty list publishes to every active domain
domain_ids = []

# round_robin, weighted or random
strategy = "round_robin"

# author_id = 1
category = "Crypto"

# Status for crawled articles: draft, published or scheduled
default_status = "draft"
default_tags = ["crypto", "news"]

# [[publishing.weights]]
# domain_id = 1
# weight = 3

[content]
min_content_length = 500
excerpt_length = 200
save_images = true
image_url_prefix = "/uploads/parsed-images"
# image_dir = "/var/lib/freshet/parsed-images"

# Bytes
max_image_size = 5242880

[initial_stats]
views = { min = 0, max = 0 }
likes = { min = 0, max = 0 }

[scraper]
# Generic content selectors, tried after the site-specific ones
content_selectors = [
    ".article-content",
    ".post-content",
    ".entry-content",
    ".content",
    "article .text",
    ".article-body",
    ".post-body",
]
"##
        .to_string()
    }
}

/// Source of settings for a run.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> Result<Settings, ConfigError>;
}

/// Reads the TOML file on every call.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(Settings::default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettings {
    fn load(&self) -> Result<Settings, ConfigError> {
        Settings::load_from(&self.path)
    }
}

/// Settings held in memory. Updates are visible to the next run.
pub struct StaticSettings {
    inner: RwLock<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

impl SettingsProvider for StaticSettings {
    fn load(&self) -> Result<Settings, ConfigError> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

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
