use serde::{Deserialize, Serialize};
use url::Url;

/// How a source is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Feed,
    Page,
}

/// Topic listings tried after the primary listing page of a page source.
const DEFAULT_TOPIC_PATHS: &[&str] = &[
    "/news/latest",
    "/news/bitcoin",
    "/news/ethereum",
    "/news/altcoin",
    "/news/defi",
    "/news/nft",
    "/news/regulation",
    "/news/technology",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub name: String,
    pub fetch_url: String,
    pub base_url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub mode: FetchMode,
    /// Extra listing pages for page sources. Derived from `fetch_url` when empty.
    #[serde(default)]
    pub listing_pages: Vec<String>,
}

fn default_weight() -> u32 {
    1
}

impl Source {
    pub fn feed(name: &str, fetch_url: &str, base_url: &str, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            fetch_url: fetch_url.to_string(),
            base_url: base_url.to_string(),
            weight,
            mode: FetchMode::Feed,
            listing_pages: Vec::new(),
        }
    }

    pub fn page(name: &str, fetch_url: &str, base_url: &str, weight: u32) -> Self {
        Self {
            mode: FetchMode::Page,
            ..Self::feed(name, fetch_url, base_url, weight)
        }
    }

    /// Homepage used to warm up a crawl session.
    pub fn homepage(&self) -> String {
        match Url::parse(&self.base_url) {
            Ok(url) => format!("{}/", url.origin().ascii_serialization()),
            Err(_) => self.base_url.clone(),
        }
    }

    /// Additional listing pages to walk when the primary page is not enough.
    pub fn additional_listings(&self) -> Vec<String> {
        if !self.listing_pages.is_empty() {
            return self.listing_pages.clone();
        }

        let mut pages = vec![
            format!("{}?page=2", self.fetch_url),
            format!("{}?page=3", self.fetch_url),
        ];
        if let Ok(url) = Url::parse(&self.fetch_url) {
            let origin = url.origin().ascii_serialization();
            pages.extend(DEFAULT_TOPIC_PATHS.iter().map(|p| format!("{}{}", origin, p)));
        }
        pages
    }

    /// Built-in registry of crypto news sources.
    pub fn defaults() -> Vec<Source> {
        vec![
            Source::feed("Decrypt", "https://decrypt.co/feed", "https://decrypt.co", 3),
            Source::feed(
                "CoinDesk",
                "https://www.coindesk.com/arc/outboundfeeds/rss/",
                "https://www.coindesk.com",
                3,
            ),
            Source::feed("U.Today", "https://u.today/rss", "https://u.today", 2),
            Source::feed(
                "NewsBTC",
                "https://www.newsbtc.com/feed/",
                "https://www.newsbtc.com",
                2,
            ),
            Source::feed(
                "BeInCrypto",
                "https://beincrypto.com/feed/",
                "https://beincrypto.com",
                2,
            ),
            Source::feed(
                "CryptoPotato",
                "https://cryptopotato.com/feed/",
                "https://cryptopotato.com",
                2,
            ),
            Source::feed(
                "CryptoSlate",
                "https://cryptoslate.com/feed/",
                "https://cryptoslate.com",
                2,
            ),
            Source::feed(
                "CoinTelegraph",
                "https://cointelegraph.com/rss",
                "https://cointelegraph.com",
                1,
            ),
            Source::page(
                "CoinTelegraph",
                "https://cointelegraph.com/news",
                "https://cointelegraph.com",
                1,
            ),
        ]
    }
}
