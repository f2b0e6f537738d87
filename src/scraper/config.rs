use serde::{Deserialize, Serialize};
use url::Url;

/// Selector groups for a known news site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteSelectors {
    pub host: &'static str,
    pub content: &'static [&'static str],
    pub image: &'static [&'static str],
}

pub const SITE_SELECTORS: &[SiteSelectors] = &[
    SiteSelectors {
        host: "cointelegraph.com",
        content: &[".post-content", ".post__content", "article .content", ".article-content"],
        image: &[".post__lead-image img", ".post-cover img", ".article-image img"],
    },
    SiteSelectors {
        host: "decrypt.co",
        content: &[".post-content", ".article-content", "[data-module=\"ArticleBody\"]"],
        image: &[".featured-image img", ".post-featured-image img"],
    },
    SiteSelectors {
        host: "coindesk.com",
        content: &[
            ".at-content .at-text",
            ".articleBody",
            ".story-body",
            ".at-body .at-text",
            "[data-module=\"ArticleBody\"]",
            ".article-content",
        ],
        image: &[
            ".featured-image img",
            ".lead-image img",
            ".article-hero img",
            ".hero-image img",
            ".at-image img",
        ],
    },
    SiteSelectors {
        host: "u.today",
        content: &[".article-body", ".post-content", ".content"],
        image: &[".article-image img", ".featured-image img"],
    },
    SiteSelectors {
        host: "newsbtc.com",
        content: &[".entry-content", ".post-content", ".article-content"],
        image: &[".featured-image img", ".post-thumbnail img"],
    },
    SiteSelectors {
        host: "beincrypto.com",
        content: &[".post-content", ".article-content", ".entry-content"],
        image: &[".featured-image img", ".post-image img"],
    },
    SiteSelectors {
        host: "cryptopotato.com",
        content: &[".post-content", ".article-content", ".entry-content"],
        image: &[".featured-image img", ".post-thumbnail img"],
    },
    SiteSelectors {
        host: "cryptoslate.com",
        content: &[".post-content", ".article-content", ".entry-content"],
        image: &[".featured-image img", ".post-image img"],
    },
];

/// Content selectors for feed articles on unknown sites.
pub const GENERIC_FEED_CONTENT: &[&str] = &[
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
    "article p",
];

/// Tried in order when the primary content is missing or thin. Selectors
/// ending in ` p` concatenate every matching paragraph.
pub const ALTERNATIVE_CONTENT: &[&str] = &[
    ".at-content .at-text",
    ".at-body .at-text",
    ".story-body",
    ".articleBody",
    "article .content",
    "article .text",
    "article .body",
    ".post-content",
    ".entry-content",
    ".article-content",
    "article p",
    ".post p",
    ".entry p",
    "main p",
];

pub const GENERIC_IMAGE_SELECTORS: &[&str] = &[
    ".featured-image img",
    ".post-image img",
    ".article-image img",
    ".post-thumbnail img",
    "img[class*=\"featured\"]",
    "img[src*=\"featured\"]",
    "img[src*=\"hero\"]",
    "img[src*=\"banner\"]",
    "img[src*=\"cover\"]",
    "img[src*=\"thumb\"]",
    ".hero img",
    ".banner img",
    ".cover img",
    ".thumbnail img",
    "article img",
    ".content img",
];

/// Social preview images, read from the `content` attribute.
pub const META_IMAGE_SELECTORS: &[&str] = &[
    "meta[property=\"og:image\"]",
    "meta[name=\"twitter:image\"]",
    "meta[property=\"og:image:url\"]",
];

pub const TITLE_SELECTORS: &[&str] = &[
    "h1.article-title",
    "h1.post-title",
    "h1.entry-title",
    ".article-header h1",
    ".post-header h1",
    "h1",
    "title",
];

pub const DATE_SELECTORS: &[&str] = &[
    "time[datetime]",
    ".publish-date",
    ".post-date",
    ".article-date",
    "[data-date]",
];

pub const TAG_SELECTOR: &str = ".tags a, .post-tags a, .article-tags a, .tag-links a";

/// Listing-page link selectors, site-specific first.
pub const LINK_SELECTORS: &[&str] = &[
    "article a[href*=\"/news/\"]",
    "a[data-testid=\"article-card-link\"]",
    ".post-card-inline a[href*=\"/news/\"]",
    "article h2 a",
    "h2 a[href*=\"/news/\"]",
    "h3 a[href*=\"/news/\"]",
    ".post-item a[href*=\"/news/\"]",
    ".news-item a[href*=\"/news/\"]",
    ".article-title a",
    ".title a[href*=\"/news/\"]",
    "a[href*=\"/news/\"][title]",
];

/// Selector table for the host of `url`, ignoring a leading `www.`.
pub fn site_for(url: &str) -> Option<&'static SiteSelectors> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    SITE_SELECTORS.iter().find(|s| s.host == host)
}

/// Tunable extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Generic content selectors for crawled pages, in priority order
    pub content_selectors: Vec<String>,

    /// Subtrees dropped before reading content
    pub remove_selectors: Vec<String>,

    /// Images kept per article, featured included (default: 10)
    pub max_images: usize,

    /// Images with an explicit smaller width or height are skipped (default: 200)
    pub min_image_dimension: u32,

    /// Tags read from a crawled page (default: 10)
    pub max_tags: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            content_selectors: vec![
                ".article-content".to_string(),
                ".post-content".to_string(),
                ".entry-content".to_string(),
                ".content".to_string(),
                "article .text".to_string(),
                ".article-body".to_string(),
                ".post-body".to_string(),
            ],
            remove_selectors: vec![
                "nav".to_string(),
                "header".to_string(),
                "footer".to_string(),
                "aside".to_string(),
                ".sidebar".to_string(),
                ".advertisement".to_string(),
                ".ad".to_string(),
                ".ads".to_string(),
                ".social-share".to_string(),
                ".share-buttons".to_string(),
                ".related-posts".to_string(),
                ".comments".to_string(),
            ],
            max_images: 10,
            min_image_dimension: 200,
            max_tags: 10,
        }
    }
}
