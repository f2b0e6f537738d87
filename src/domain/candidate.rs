use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MAX_TITLE_CHARS: usize = 255;
pub const MAX_EXCERPT_CHARS: usize = 500;
pub const MAX_SLUG_CHARS: usize = 100;

/// An article discovered by a feed or a listing page, not yet extracted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleCandidate {
    pub title: String,
    pub slug: String,
    pub source_url: String,
    pub excerpt: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
    pub source_weight: u32,
    pub tags: Vec<String>,
}

impl ArticleCandidate {
    pub fn new(title: &str, source_url: &str, source_name: &str, source_weight: u32) -> Self {
        let title = truncate_chars(title.trim(), MAX_TITLE_CHARS);
        Self {
            slug: slugify(&title),
            title,
            source_url: source_url.to_string(),
            excerpt: String::new(),
            published_at: Utc::now(),
            source_name: source_name.to_string(),
            source_weight,
            tags: Vec::new(),
        }
    }

    pub fn with_excerpt(mut self, excerpt: &str) -> Self {
        self.excerpt = truncate_chars(excerpt.trim(), MAX_EXCERPT_CHARS);
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Priority order: heavier sources first, then newest first.
    pub fn sort_by_priority(candidates: &mut [ArticleCandidate]) {
        candidates.sort_by(|a, b| {
            b.source_weight
                .cmp(&a.source_weight)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
    }
}

/// Deterministic URL slug for a title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    let mut slug = truncate_chars(&slug, MAX_SLUG_CHARS);
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        let digest = hex::encode(Sha256::digest(title.as_bytes()));
        return format!("article-{}", &digest[..12]);
    }
    slug
}

/// Truncate on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_collapses_symbols() {
        assert_eq!(
            slugify("Bitcoin Hits $100K -- What's Next?"),
            "bitcoin-hits-100k-what-s-next"
        );
    }

    #[test]
    fn test_slugify_is_deterministic() {
        let title = "ETH/BTC ratio: a 2024 low";
        assert_eq!(slugify(title), slugify(title));
        assert_eq!(slugify(title), "eth-btc-ratio-a-2024-low");
    }

    #[test]
    fn test_slugify_truncates() {
        let title = "word ".repeat(60);
        let slug = slugify(&title);
        assert!(slug.len() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_non_ascii_falls_back_to_hash() {
        let slug = slugify("Биткоин растёт");
        assert!(slug.starts_with("article-"));
        assert_eq!(slug.len(), "article-".len() + 12);
        assert_eq!(slug, slugify("Биткоин растёт"));
    }

    #[test]
    fn test_new_truncates_title_and_derives_slug() {
        let long = "a".repeat(300);
        let candidate = ArticleCandidate::new(&long, "https://x.com/a", "X", 1);
        assert_eq!(candidate.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(candidate.slug.len(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_sort_by_priority() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut candidates = vec![
            ArticleCandidate::new("low old", "https://a/1", "A", 1).with_published_at(t1),
            ArticleCandidate::new("high old", "https://b/1", "B", 3).with_published_at(t1),
            ArticleCandidate::new("high new", "https://b/2", "B", 3).with_published_at(t2),
            ArticleCandidate::new("low new", "https://a/2", "A", 1).with_published_at(t2),
        ];
        ArticleCandidate::sort_by_priority(&mut candidates);
        let titles: Vec<_> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["high new", "high old", "low new", "low old"]);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
