//! # Freshet
//!
//! A content acquisition pipeline for crypto news sites.
//!
//! ## Architecture
//!
//! ```text
//! Feeds / listing pages → candidates → dedup → extraction → quality gate
//!     → domain assignment → images → Store
//! ```
//!
//! - [`fetcher`]: HTTP client, crawl sessions and bounded-parallel feed fetching
//! - [`normalizer`]: Converts RSS/Atom feeds into article candidates
//! - [`crawler`]: Discovers article links on listing pages
//! - [`scraper`]: Full-text extraction and the quality gate
//! - [`pipeline`]: The per-run orchestrator with adaptive widening
//! - [`scheduler`]: Interval timer with a single-flight guard
//! - [`store`]: SQLite persistence layer
//!
//! ## Quick Start
//!
//! ```bash
//! # Register where articles go and who writes them
//! freshet domain add "Main" news.example.com
//! freshet author add editor
//!
//! # Publish three articles now
//! freshet run --count 3
//!
//! # Keep running on the configured schedule
//! freshet schedule
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// settings, pipeline and scheduler.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/freshet/config.toml`.
pub mod config;

/// Listing-page link discovery for page-mode sources.
pub mod crawler;

/// Pre-save duplicate detection against the article store.
pub mod dedup;

/// Publishing domain selection strategies.
pub mod distribution;

/// Core domain models.
///
/// - [`ArticleCandidate`](domain::ArticleCandidate): a discovered, unextracted article
/// - [`PublishedArticle`](domain::PublishedArticle): the persisted article row
/// - [`RunResult`](domain::RunResult): counters and status of one run
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for GET requests
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent feed fetching with semaphore
/// - [`Session`](fetcher::session::Session): Cookies and browser identity for one run
pub mod fetcher;

/// Feed parsing and normalization into candidates.
pub mod normalizer;

/// Run orchestration.
pub mod pipeline;

/// Background scheduling.
pub mod scheduler;

/// Full article extraction from HTML pages.
pub mod scraper;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
