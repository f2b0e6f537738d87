use chrono::{DateTime, NaiveDate, Utc};
use ::scraper::{Html, Selector};
use url::Url;

use crate::app::Result;
use crate::config::ContentSettings;
use crate::domain::{truncate_chars, ArticleCandidate, ExtractedContent, ImageRef, QualityFlag};
use crate::fetcher::session::Session;
use crate::fetcher::Fetcher;
use crate::scraper::clean::{make_excerpt, Cleaned, Cleaner};
use crate::scraper::config::{
    site_for, ScraperConfig, ALTERNATIVE_CONTENT, DATE_SELECTORS, GENERIC_FEED_CONTENT,
    TAG_SELECTOR, TITLE_SELECTORS,
};
use crate::scraper::images::{body_images, extract_images, merge_images};
use crate::scraper::quality::{self, Verdict, MIN_FEED_TEXT};

/// Referer sent with feed-article requests.
pub const SEARCH_REFERER: &str = "https://www.google.com/";

/// Minimum HTML length for a content selector to be accepted.
const MIN_SELECTOR_HTML: usize = 200;
/// Paragraph fallback on crawled pages keeps paragraphs longer than this.
const MIN_PAGE_PARAGRAPH: usize = 50;
/// Paragraph selectors on the feed path keep paragraphs longer than this.
const MIN_FEED_PARAGRAPH: usize = 20;
/// An alternative selector must yield more text than this.
const MIN_ALTERNATIVE_TEXT: usize = 300;
const MIN_PAGE_TITLE: usize = 10;
const MAX_PAGE_TITLE: usize = 200;

/// Outcome of extracting one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Accepted(ExtractedContent),
    TooShort { length: usize },
}

/// Full-text extraction with ordered selector fallbacks and the quality gate.
pub struct ContentExtractor {
    config: ScraperConfig,
    cleaner: Cleaner,
    min_content_length: usize,
    excerpt_length: usize,
}

impl ContentExtractor {
    pub fn new(config: ScraperConfig, content: &ContentSettings) -> Self {
        let cleaner = Cleaner::new(&config.remove_selectors);
        Self {
            config,
            cleaner,
            min_content_length: content.min_content_length,
            excerpt_length: content.excerpt_length,
        }
    }

    /// Crawled-page path. A fetch failure that survives the 403 retry is an error.
    pub async fn extract_page<F>(
        &self,
        fetcher: &F,
        session: &mut Session,
        candidate: &ArticleCandidate,
        listing_url: &str,
        homepage: &str,
    ) -> Result<Extraction>
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        let body = session
            .get_with_retry(fetcher, &candidate.source_url, Some(listing_url), homepage)
            .await?;
        Ok(self.parse_page(&String::from_utf8_lossy(&body), candidate))
    }

    /// Feed path. Never fails: any fetch problem degrades the candidate.
    pub async fn extract_feed<F>(
        &self,
        fetcher: &F,
        session: &mut Session,
        candidate: &ArticleCandidate,
        homepage: &str,
    ) -> ExtractedContent
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        match session
            .get_with_retry(fetcher, &candidate.source_url, Some(SEARCH_REFERER), homepage)
            .await
        {
            Ok(body) => self.parse_feed_article(&String::from_utf8_lossy(&body), candidate),
            Err(e) => {
                tracing::warn!("Using excerpt for {}: {}", candidate.source_url, e);
                degraded(candidate, Vec::new())
            }
        }
    }

    pub fn parse_page(&self, html: &str, candidate: &ArticleCandidate) -> Extraction {
        let doc = Html::parse_document(html);
        let site = site_for(&candidate.source_url);
        let base = Url::parse(&candidate.source_url).ok();

        let title = self.page_title(&doc).unwrap_or_else(|| candidate.title.clone());
        let images = extract_images(
            &doc,
            &candidate.source_url,
            site.map(|s| s.image).unwrap_or_default(),
            &title,
            &self.config,
        );

        let site_content = site.map(|s| s.content).unwrap_or_default();
        let generic: Vec<&str> = self.config.content_selectors.iter().map(String::as_str).collect();
        let content = self
            .first_substantial(&doc, site_content.iter().copied().chain(generic), base.as_ref())
            .unwrap_or_else(|| self.paragraph_fallback(&doc, base.as_ref()));

        match quality::assess(&content.html, &content.text, 0) {
            Verdict::Blocked | Verdict::PriceWidget => {
                tracing::info!("Degrading blocked page {}", candidate.source_url);
                let mut extracted = degraded(candidate, images);
                extracted.title = Some(title);
                return Extraction::Accepted(extracted);
            }
            _ => {}
        }

        let length = content.text_len();
        if length < self.min_content_length {
            return Extraction::TooShort { length };
        }

        let mut tags = Vec::new();
        if let Ok(selector) = Selector::parse(TAG_SELECTOR) {
            for el in doc.select(&selector) {
                let tag = el.text().collect::<String>().trim().to_string();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
                if tags.len() >= self.config.max_tags {
                    break;
                }
            }
        }

        let mut images = images;
        merge_images(
            &mut images,
            body_images(&content.html, &candidate.source_url, &title, &self.config),
            self.config.max_images,
        );

        let mut images = images.into_iter();
        Extraction::Accepted(ExtractedContent {
            excerpt: Some(make_excerpt(&content.text, self.excerpt_length)),
            html_body: content.html,
            plain_text_length: length,
            featured_image: images.next(),
            gallery: images.collect(),
            extracted_tags: tags,
            quality: QualityFlag::Ok,
            title: Some(title),
            published_at: page_date(&doc),
        })
    }

    pub fn parse_feed_article(&self, html: &str, candidate: &ArticleCandidate) -> ExtractedContent {
        let doc = Html::parse_document(html);
        let site = site_for(&candidate.source_url);

        let images = extract_images(
            &doc,
            &candidate.source_url,
            site.map(|s| s.image).unwrap_or_default(),
            &candidate.title,
            &self.config,
        );

        let base = Url::parse(&candidate.source_url).ok();
        let primary = site.map(|s| s.content).unwrap_or(GENERIC_FEED_CONTENT);
        let mut content = self.first_present(&doc, primary, base.as_ref()).unwrap_or_default();

        if content.html.len() < MIN_SELECTOR_HTML {
            tracing::debug!("Trying alternative selectors for {}", candidate.source_url);
            if let Some(alternative) = self.alternative(&doc, base.as_ref()) {
                content = alternative;
            }
        }

        let verdict = quality::assess(&content.html, &content.text, MIN_FEED_TEXT);
        if !verdict.is_ok() {
            tracing::info!(
                "Using excerpt for {} ({:?}, {} chars)",
                candidate.source_url,
                verdict,
                content.text_len()
            );
            return degraded(candidate, images);
        }

        let mut images = images;
        merge_images(
            &mut images,
            body_images(&content.html, &candidate.source_url, &candidate.title, &self.config),
            self.config.max_images,
        );

        let mut images = images.into_iter();
        ExtractedContent {
            plain_text_length: content.text_len(),
            html_body: content.html,
            featured_image: images.next(),
            gallery: images.collect(),
            extracted_tags: Vec::new(),
            quality: QualityFlag::Ok,
            title: None,
            published_at: None,
            excerpt: None,
        }
    }

    fn page_title(&self, doc: &Html) -> Option<String> {
        TITLE_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .filter_map(|selector| {
                doc.select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
            })
            .find(|t| t.chars().count() > MIN_PAGE_TITLE)
            .map(|t| truncate_chars(&t, MAX_PAGE_TITLE))
    }

    /// First selector whose cleaned HTML is long enough.
    fn first_substantial<'a>(
        &self,
        doc: &Html,
        selectors: impl Iterator<Item = &'a str>,
        base: Option<&Url>,
    ) -> Option<Cleaned> {
        for raw in selectors {
            let Ok(selector) = Selector::parse(raw) else {
                tracing::debug!("Skipping invalid selector {}", raw);
                continue;
            };
            if let Some(el) = doc.select(&selector).next() {
                let cleaned = self.cleaner.clean_at(el, base);
                if cleaned.html.len() > MIN_SELECTOR_HTML {
                    tracing::debug!("Content matched {}", raw);
                    return Some(cleaned);
                }
            }
        }
        None
    }

    /// First selector that matches anything, regardless of length.
    fn first_present(&self, doc: &Html, selectors: &[&str], base: Option<&Url>) -> Option<Cleaned> {
        selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .find_map(|selector| doc.select(&selector).next().map(|el| self.cleaner.clean_at(el, base)))
    }

    fn paragraph_fallback(&self, doc: &Html, base: Option<&Url>) -> Cleaned {
        self.paragraphs(doc, "p", MIN_PAGE_PARAGRAPH, base)
            .unwrap_or_default()
    }

    fn alternative(&self, doc: &Html, base: Option<&Url>) -> Option<Cleaned> {
        for raw in ALTERNATIVE_CONTENT {
            let candidate = if raw.ends_with(" p") {
                self.paragraphs(doc, raw, MIN_FEED_PARAGRAPH, base)
            } else {
                Selector::parse(raw)
                    .ok()
                    .and_then(|s| doc.select(&s).next().map(|el| self.cleaner.clean_at(el, base)))
            };

            let Some(content) = candidate else {
                continue;
            };
            if content.text_len() <= MIN_ALTERNATIVE_TEXT {
                continue;
            }
            if quality::is_price_widget(&content.text) {
                tracing::debug!("Skipping price widget matched by {}", raw);
                continue;
            }
            tracing::debug!("Alternative content matched {}", raw);
            return Some(content);
        }
        None
    }

    /// Concatenate matching paragraphs longer than `min_chars`.
    fn paragraphs(&self, doc: &Html, raw: &str, min_chars: usize, base: Option<&Url>) -> Option<Cleaned> {
        let selector = Selector::parse(raw).ok()?;
        let kept: Vec<Cleaned> = doc
            .select(&selector)
            .filter(|p| !self.cleaner.is_excluded(p))
            .map(|p| self.cleaner.clean_at(p, base))
            .filter(|p| p.text_len() > min_chars)
            .collect();

        if kept.is_empty() {
            return None;
        }
        Some(Cleaned {
            html: kept
                .iter()
                .map(|p| format!("<p>{}</p>", p.html))
                .collect::<Vec<_>>()
                .join("\n"),
            text: kept
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        })
    }
}

/// Excerpt-and-link stub for a candidate whose body was rejected.
pub fn degraded(candidate: &ArticleCandidate, images: Vec<ImageRef>) -> ExtractedContent {
    let html_body = quality::degraded_body(&candidate.excerpt, &candidate.source_url);
    let mut images = images.into_iter();
    ExtractedContent {
        plain_text_length: candidate.excerpt.chars().count(),
        html_body,
        featured_image: images.next(),
        gallery: images.collect(),
        extracted_tags: Vec::new(),
        quality: QualityFlag::Degraded,
        title: None,
        published_at: None,
        excerpt: None,
    }
}

fn page_date(doc: &Html) -> Option<DateTime<Utc>> {
    DATE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .filter_map(|selector| doc.select(&selector).next())
        .find_map(|el| {
            let raw = el
                .value()
                .attr("datetime")
                .or_else(|| el.value().attr("data-date"))
                .map(str::to_string)
                .unwrap_or_else(|| el.text().collect::<String>());
            parse_date(raw.trim())
        })
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::session::SessionTiming;
    use crate::fetcher::stub::StubFetcher;
    use crate::fetcher::FetchResponse;
    use chrono::TimeZone;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(ScraperConfig::default(), &ContentSettings::default())
    }

    fn paragraph(i: usize) -> String {
        format!(
            "<p>Paragraph {} explains how on-chain activity and derivatives funding shaped the week in digital asset markets.</p>",
            i
        )
    }

    fn article_page(body: &str) -> String {
        format!(
            r#"<html><head><title>Site</title></head><body>
            <h1 class="article-title">Bitcoin funding flips positive again</h1>
            <time datetime="2024-03-05T10:00:00Z">March 5</time>
            <div class="article-content">{}<script>track()</script>
              <div class="related-posts"><p>Related story that should never appear in the body text</p></div>
            </div>
            <div class="tags"><a>Bitcoin</a><a>Markets</a><a>Bitcoin</a></div>
            </body></html>"#,
            body
        )
    }

    fn candidate(url: &str) -> ArticleCandidate {
        ArticleCandidate::new("Listing title for the story", url, "Example", 1)
            .with_excerpt("Funding rates flipped positive.")
    }

    #[test]
    fn test_parse_page_accepts_long_article() {
        let body: String = (0..6).map(paragraph).collect();
        let extraction = extractor().parse_page(&article_page(&body), &candidate("https://example.com/news/a"));

        let Extraction::Accepted(content) = extraction else {
            panic!("expected accepted, got {:?}", extraction);
        };
        assert_eq!(content.quality, QualityFlag::Ok);
        assert_eq!(content.title.as_deref(), Some("Bitcoin funding flips positive again"));
        assert_eq!(
            content.published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(content.extracted_tags, vec!["Bitcoin", "Markets"]);
        assert!(!content.html_body.contains("track()"));
        assert!(!content.html_body.contains("Related story"));
        assert!(content.plain_text_length >= 500);
        let excerpt = content.excerpt.unwrap();
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 203);
    }

    #[test]
    fn test_parse_page_too_short() {
        let extraction = extractor().parse_page(&article_page(&paragraph(1)), &candidate("https://example.com/news/a"));
        assert!(matches!(extraction, Extraction::TooShort { length } if length < 500));
    }

    #[test]
    fn test_parse_page_paragraph_fallback() {
        let body: String = (0..6).map(paragraph).collect();
        let html = format!("<html><body><h1>Short</h1><main>{}<p>tiny</p></main></body></html>", body);
        let extraction = extractor().parse_page(&html, &candidate("https://example.com/news/a"));

        let Extraction::Accepted(content) = extraction else {
            panic!("expected accepted");
        };
        assert!(!content.html_body.contains("tiny"));
        assert_eq!(content.title.as_deref(), Some("Listing title for the story"));
    }

    #[test]
    fn test_parse_page_javascript_wall_degrades() {
        let body: String = (0..6).map(paragraph).collect();
        let html = article_page(&format!("<p>Please enable JavaScript to view this page.</p>{}", body));
        let extraction = extractor().parse_page(&html, &candidate("https://example.com/news/a"));

        let Extraction::Accepted(content) = extraction else {
            panic!("expected degraded content");
        };
        assert!(content.is_degraded());
        assert_eq!(
            content.html_body,
            quality::degraded_body("Funding rates flipped positive.", "https://example.com/news/a")
        );
    }

    #[test]
    fn test_parse_feed_article_site_selector() {
        let body: String = (0..4).map(paragraph).collect();
        let html = format!(
            r#"<html><body><div class="post-content">{}</div>
            <div class="featured-image"><img src="/lead.jpg"></div></body></html>"#,
            body
        );
        let content = extractor().parse_feed_article(&html, &candidate("https://decrypt.co/123/story"));

        assert_eq!(content.quality, QualityFlag::Ok);
        assert!(content.html_body.contains("Paragraph 3"));
        assert_eq!(
            content.featured_image.unwrap().url,
            "https://decrypt.co/lead.jpg"
        );
    }

    #[test]
    fn test_parse_feed_article_alternative_skips_price_widget() {
        let widget = "<div class=\"story-body\">BTC$64000 +0.01% ETH$3100 -2.12% SOL$140 -7.26% XRP$0.5 \
            and a great deal of filler text to push the widget well beyond three hundred characters of \
            visible text so that only the price detector can reject it. More filler words here to be safe, \
            and then some more filler words after that one as well to clear the bar comfortably.</div>";
        let body: String = (0..4).map(paragraph).collect();
        let html = format!("<html><body>{}<main>{}</main></body></html>", widget, body);

        let content = extractor().parse_feed_article(&html, &candidate("https://unknown.example/news/a"));
        assert_eq!(content.quality, QualityFlag::Ok);
        assert!(!content.html_body.contains("BTC$"));
        assert!(content.html_body.starts_with("<p>Paragraph 0"));
    }

    #[test]
    fn test_parse_feed_article_thin_degrades() {
        let html = "<html><body><div class=\"post-content\"><p>Too short.</p></div></body></html>";
        let content = extractor().parse_feed_article(html, &candidate("https://unknown.example/news/a"));
        assert!(content.is_degraded());
        assert!(content.html_body.contains("Funding rates flipped positive."));
    }

    #[test]
    fn test_parse_feed_article_resolves_inline_images() {
        let body: String = (0..4).map(paragraph).collect();
        let html = format!(
            r#"<html><body><div class="post-content">{}<img src="/img/chart.png" width="800" height="400"></div></body></html>"#,
            body
        );
        let content = extractor().parse_feed_article(&html, &candidate("https://unknown.example/news/a"));

        assert_eq!(content.quality, QualityFlag::Ok);
        assert!(content
            .html_body
            .contains(r#"<img src="https://unknown.example/img/chart.png""#));
        assert_eq!(
            content.featured_image.unwrap().url,
            "https://unknown.example/img/chart.png"
        );
    }

    #[tokio::test]
    async fn test_extract_feed_degrades_on_fetch_failure() {
        let fetcher = StubFetcher::new()
            .respond("https://example.com/news/a", FetchResponse::status(403))
            .html("https://example.com/", "home");
        let mut session = Session::new(SessionTiming::immediate());

        let content = extractor()
            .extract_feed(&fetcher, &mut session, &candidate("https://example.com/news/a"), "https://example.com/")
            .await;

        assert!(content.is_degraded());
        assert_eq!(fetcher.request_count("https://example.com/news/a"), 2);
        let headers = fetcher.headers_for("https://example.com/news/a").unwrap();
        assert!(headers.contains(&("Referer".to_string(), SEARCH_REFERER.to_string())));
    }

    #[tokio::test]
    async fn test_extract_page_forbidden_twice_is_error() {
        let fetcher = StubFetcher::new()
            .respond("https://example.com/news/a", FetchResponse::status(403))
            .html("https://example.com/", "home");
        let mut session = Session::new(SessionTiming::immediate());

        let result = extractor()
            .extract_page(
                &fetcher,
                &mut session,
                &candidate("https://example.com/news/a"),
                "https://example.com/news",
                "https://example.com/",
            )
            .await;

        assert!(result.unwrap_err().is_forbidden());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-01-02T03:04:05+02:00").is_some());
        assert!(parse_date("Tue, 02 Jan 2024 03:04:05 GMT").is_some());
        assert_eq!(
            parse_date("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert!(parse_date("yesterday").is_none());
    }
}
