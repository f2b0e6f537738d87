use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    Ok,
    Degraded,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Ok => "ok",
            QualityFlag::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub html_body: String,
    pub plain_text_length: usize,
    pub featured_image: Option<ImageRef>,
    pub gallery: Vec<ImageRef>,
    pub extracted_tags: Vec<String>,
    pub quality: QualityFlag,
    /// Title read from the article page, when the page was parsed.
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Excerpt generated from the page text, when the page was parsed.
    pub excerpt: Option<String>,
}

impl ExtractedContent {
    pub fn is_degraded(&self) -> bool {
        self.quality == QualityFlag::Degraded
    }

    /// All images, featured first.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.featured_image.iter().chain(self.gallery.iter())
    }
}
