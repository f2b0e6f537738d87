use chrono::{DateTime, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::app::{FreshetError, Result};
use crate::domain::{ArticleCandidate, Source};

pub const MAX_KEYWORD_TAGS: usize = 5;
pub const MAX_TAGS: usize = 10;

/// Vocabulary matched as whole words against title and description.
const CRYPTO_KEYWORDS: &[&str] = &[
    "bitcoin", "btc", "ethereum", "eth", "crypto", "blockchain", "defi", "nft",
    "solana", "sol", "cardano", "ada", "polkadot", "dot", "chainlink", "link",
    "binance", "bnb", "ripple", "xrp", "dogecoin", "doge", "shiba", "avalanche",
    "avax", "polygon", "matic", "uniswap", "uni", "trading", "investment", "price",
    "market", "bullish", "bearish", "mining", "staking", "yield", "exchange",
    "wallet", "token", "coin", "altcoin", "hodl", "regulation", "sec", "etf",
    "institutional", "adoption",
];

static CDATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static KEYWORDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    CRYPTO_KEYWORDS
        .iter()
        .map(|k| (*k, Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k))).expect("valid regex")))
        .collect()
});

/// Unwrap CDATA, drop tags, decode entities and collapse whitespace.
pub fn strip_html(raw: &str) -> String {
    let unwrapped = CDATA.replace_all(raw, "$1");
    let without_tags = TAG.replace_all(&unwrapped, " ");
    let decoded = decode_html_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Base tags, feed categories and vocabulary hits, filtered and capped.
pub fn build_tags(source_name: &str, categories: &[String], text: &str) -> Vec<String> {
    let mut raw: Vec<String> = vec![
        "crypto".to_string(),
        "news".to_string(),
        source_name.to_lowercase(),
    ];
    raw.extend(categories.iter().map(|c| c.trim().to_lowercase()));
    raw.extend(
        KEYWORDS
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .take(MAX_KEYWORD_TAGS)
            .map(|(k, _)| k.to_string()),
    );

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let len = tag.chars().count();
        if (2..30).contains(&len) && !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

#[derive(Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse an RSS or Atom body into candidates for `source`.
    ///
    /// Entries without a title or link are dropped. Relative links resolve
    /// against the source base URL; missing dates default to `fetched_at`.
    pub fn normalize(
        &self,
        source: &Source,
        body: &[u8],
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<ArticleCandidate>> {
        let feed = parser::parse(body).map_err(|e| FreshetError::FeedParse(e.to_string()))?;
        let base = Url::parse(&source.base_url).ok();

        let candidates = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let title = entry
                    .title
                    .map(|t| strip_html(&t.content))
                    .filter(|t| !t.is_empty())?;
                let href = entry.links.first().map(|l| l.href.trim().to_string())?;
                let link = resolve_link(base.as_ref(), &href)?;

                let description = entry
                    .summary
                    .map(|s| strip_html(&s.content))
                    .or_else(|| entry.content.and_then(|c| c.body).map(|b| strip_html(&b)))
                    .unwrap_or_default();

                let categories: Vec<String> = entry
                    .categories
                    .iter()
                    .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
                    .collect();

                let published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(fetched_at);

                let tags = build_tags(
                    &source.name,
                    &categories,
                    &format!("{} {}", title, description),
                );

                Some(
                    ArticleCandidate::new(&title, &link, &source.name, source.weight)
                        .with_excerpt(&description)
                        .with_published_at(published_at)
                        .with_tags(tags),
                )
            })
            .collect();

        Ok(candidates)
    }
}

fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
        }
        Err(_) => None,
    }
}
