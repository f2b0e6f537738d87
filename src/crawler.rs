use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ::scraper::{ElementRef, Html, Selector};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{truncate_chars, ArticleCandidate, Source};
use crate::fetcher::session::Session;
use crate::fetcher::Fetcher;
use crate::scraper::config::LINK_SELECTORS;

/// Default pause before each additional listing page.
pub const DEFAULT_LISTING_DELAY: Duration = Duration::from_millis(1500);

const MIN_LINK_TITLE: usize = 15;
const MAX_LINK_TITLE: usize = 200;

static ENUMERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\d.\-–—]+\s*").expect("valid regex"));

static ARTICLE_SHAPES: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"/news/[^/]+/$").expect("valid regex"),
        Regex::new(r"/news/[^/]+-\d+$").expect("valid regex"),
        Regex::new(r"/news/[\w-]+$").expect("valid regex"),
    ]
});

/// A link found on a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLink {
    pub url: String,
    pub title: String,
}

/// Discovers article links on the listing pages of page-mode sources.
pub struct PageCrawler {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    listing_delay: Duration,
}

impl PageCrawler {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_listing_delay(fetcher, DEFAULT_LISTING_DELAY)
    }

    pub fn with_listing_delay(fetcher: Arc<dyn Fetcher + Send + Sync>, listing_delay: Duration) -> Self {
        Self {
            fetcher,
            listing_delay,
        }
    }

    /// Collect up to `ceil(target * 1.5)` unseen article candidates.
    ///
    /// The primary listing page is always fetched. Additional listings are
    /// walked only while fewer than `target` links are known. Listing
    /// failures are logged and skipped.
    pub async fn discover_links(
        &self,
        source: &Source,
        target: usize,
        session: &mut Session,
        seen: &HashSet<String>,
    ) -> Vec<ArticleCandidate> {
        let homepage = source.homepage();
        if !session.has_cookies_for(&homepage) {
            if let Err(e) = session.warm_up(self.fetcher.as_ref(), &homepage).await {
                debug!("Warm-up for {} failed: {}", source.name, e);
            }
        }

        let limit = (target * 3).div_ceil(2);
        let mut links: Vec<DiscoveredLink> = Vec::new();
        let mut local_seen: HashSet<String> = HashSet::new();

        self.crawl_listing(&source.fetch_url, limit, session, &homepage, seen, &mut local_seen, &mut links)
            .await;

        if links.len() < target {
            for page in source.additional_listings() {
                if links.len() >= limit {
                    break;
                }
                tokio::time::sleep(self.listing_delay).await;
                self.crawl_listing(&page, limit, session, &homepage, seen, &mut local_seen, &mut links)
                    .await;
                debug!("{} links after {}", links.len(), page);
            }
        }

        info!(source = %source.name, found = links.len(), "Listing crawl finished");

        let found_at = Utc::now();
        links
            .into_iter()
            .map(|link| {
                ArticleCandidate::new(&link.title, &link.url, &source.name, source.weight)
                    .with_published_at(found_at)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    async fn crawl_listing(
        &self,
        page_url: &str,
        limit: usize,
        session: &mut Session,
        homepage: &str,
        seen: &HashSet<String>,
        local_seen: &mut HashSet<String>,
        links: &mut Vec<DiscoveredLink>,
    ) {
        let body = match session
            .get_with_retry(self.fetcher.as_ref(), page_url, None, homepage)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(page = %page_url, error = %e, "listing_fetch_error");
                return;
            }
        };

        for link in parse_listing(&String::from_utf8_lossy(&body), page_url) {
            if links.len() >= limit {
                break;
            }
            if seen.contains(&link.url) || !local_seen.insert(link.url.clone()) {
                continue;
            }
            links.push(link);
        }
    }
}

/// Extract article links from a listing page, in selector priority order.
pub fn parse_listing(html: &str, page_url: &str) -> Vec<DiscoveredLink> {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let mut found = Vec::new();

    for raw in LINK_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in doc.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(title) = link_title(&element) else {
                continue;
            };
            if !href.contains("/news/") {
                continue;
            }

            let url = match &base {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if is_article_url(&url) {
                found.push(DiscoveredLink { url, title });
            }
        }
    }

    found
}

fn link_title(element: &ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>().trim().to_string();
    let raw = if !text.is_empty() {
        text
    } else if let Some(title) = element.value().attr("title").filter(|t| !t.trim().is_empty()) {
        title.trim().to_string()
    } else {
        let inner = Selector::parse("span, div").ok()?;
        element
            .select(&inner)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    };

    let title = ENUMERATOR.replace(&raw, "").trim().to_string();
    if title.chars().count() > MIN_LINK_TITLE {
        Some(truncate_chars(&title, MAX_LINK_TITLE))
    } else {
        None
    }
}

/// True when the URL looks like an article rather than a category page.
pub fn is_article_url(url: &str) -> bool {
    ARTICLE_SHAPES.iter().any(|re| re.is_match(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::session::SessionTiming;
    use crate::fetcher::stub::StubFetcher;

    const LISTING: &str = r#"
        <html><body>
          <article><a href="/news/bitcoin-hits-new-high">1. Bitcoin hits a new all-time high</a></article>
          <article><a href="/news/ether-etf-approved-12345">Ether ETF approved by regulators today</a></article>
          <h2><a href="https://example.com/news/solana-upgrade/">Solana upgrade ships to mainnet</a></h2>
          <h3><a href="/news/short">Too short</a></h3>
          <a href="/markets/btc" title="A market page link with a long title">Markets</a>
          <a href="/news/defi-weekly" title="DeFi weekly roundup for this week"></a>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_filters_and_cleans() {
        let links = parse_listing(LISTING, "https://example.com/news");
        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();

        assert!(urls.contains(&"https://example.com/news/bitcoin-hits-new-high"));
        assert!(urls.contains(&"https://example.com/news/ether-etf-approved-12345"));
        assert!(urls.contains(&"https://example.com/news/solana-upgrade/"));
        assert!(urls.contains(&"https://example.com/news/defi-weekly"));
        assert!(!urls.iter().any(|u| u.contains("/markets/")));
        assert!(!urls.iter().any(|u| u.ends_with("/short")));

        let btc = links
            .iter()
            .find(|l| l.url.ends_with("bitcoin-hits-new-high"))
            .unwrap();
        assert_eq!(btc.title, "Bitcoin hits a new all-time high");

        let defi = links.iter().find(|l| l.url.ends_with("defi-weekly")).unwrap();
        assert_eq!(defi.title, "DeFi weekly roundup for this week");
    }

    #[test]
    fn test_article_url_shapes() {
        assert!(is_article_url("https://x.com/news/some-slug/"));
        assert!(is_article_url("https://x.com/news/some-slug-123"));
        assert!(is_article_url("https://x.com/news/some_slug"));
        assert!(!is_article_url("https://x.com/news/"));
        assert!(!is_article_url("https://x.com/news/a/b"));
    }

    fn listing_with(count: usize, prefix: &str) -> String {
        let items: String = (0..count)
            .map(|i| {
                format!(
                    r#"<article><a href="/news/{prefix}-story-number-{i}">Story about {prefix} number {i}</a></article>"#
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", items)
    }

    #[tokio::test]
    async fn test_discover_stops_at_primary_when_enough() {
        let source = Source::page("Example", "https://example.com/news", "https://example.com", 1);
        let fetcher = Arc::new(StubFetcher::new().html("https://example.com/news", &listing_with(6, "main")));
        let crawler = PageCrawler::with_listing_delay(fetcher.clone(), Duration::ZERO);
        let mut session = Session::new(SessionTiming::immediate());

        let found = crawler.discover_links(&source, 3, &mut session, &HashSet::new()).await;

        // ceil(3 * 1.5) = 5
        assert_eq!(found.len(), 5);
        assert_eq!(fetcher.request_count("https://example.com/news?page=2"), 0);
        assert_eq!(fetcher.request_count("https://example.com/"), 1);
        assert!(found.iter().all(|c| c.published_at == found[0].published_at));
    }

    #[tokio::test]
    async fn test_discover_walks_more_listings() {
        let source = Source::page("Example", "https://example.com/news", "https://example.com", 2);
        let fetcher = Arc::new(
            StubFetcher::new()
                .html("https://example.com/news", &listing_with(1, "main"))
                .fail("https://example.com/news?page=2", "timeout")
                .html("https://example.com/news?page=3", &listing_with(8, "third")),
        );
        let crawler = PageCrawler::with_listing_delay(fetcher.clone(), Duration::ZERO);
        let mut session = Session::new(SessionTiming::immediate());

        let found = crawler.discover_links(&source, 4, &mut session, &HashSet::new()).await;

        // The failing second page is skipped and the limit of 6 stops the walk.
        assert_eq!(found.len(), 6);
        assert_eq!(fetcher.request_count("https://example.com/news?page=2"), 1);
        assert_eq!(found[0].source_weight, 2);
        assert_eq!(fetcher.request_count("https://example.com/news/latest"), 0);
    }

    #[tokio::test]
    async fn test_discover_skips_seen_urls() {
        let source = Source::page("Example", "https://example.com/news", "https://example.com", 1);
        let fetcher = Arc::new(StubFetcher::new().html("https://example.com/news", &listing_with(3, "main")));
        let crawler = PageCrawler::with_listing_delay(fetcher, Duration::ZERO);
        let mut session = Session::new(SessionTiming::immediate());
        let seen: HashSet<String> = ["https://example.com/news/main-story-number-0".to_string()].into();

        let found = crawler.discover_links(&source, 1, &mut session, &seen).await;

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| !seen.contains(&c.source_url)));
    }
}
