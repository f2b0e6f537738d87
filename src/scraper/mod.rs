//! Full-text extraction for article candidates.
//!
//! Two paths share the same building blocks:
//!
//! ```text
//! crawled page → session GET → content chain → quality gate → Accepted | TooShort
//! feed item    → session GET → site table → alternative chain → quality gate → ok | degraded
//! ```
//!
//! Each chain is an ordered list of selector strategies over a parsed
//! document; the first acceptable match wins. The quality gate in
//! [`quality`] is a pure function, so the same body always yields the same
//! verdict.
//!
//! # Usage
//!
//! ```rust,ignore
//! use freshet::scraper::{ContentExtractor, ScraperConfig};
//!
//! let extractor = ContentExtractor::new(ScraperConfig::default(), &settings.content);
//! let content = extractor
//!     .extract_feed(fetcher.as_ref(), &mut session, &candidate, &source.homepage())
//!     .await;
//! ```

pub mod clean;
pub mod config;
pub mod extractor;
pub mod images;
pub mod quality;

pub use config::ScraperConfig;
pub use extractor::{ContentExtractor, Extraction};
pub use images::ImageSaver;
