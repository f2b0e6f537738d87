use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ImageRef, QualityFlag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
    Scheduled,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
            ArticleStatus::Scheduled => "scheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ArticleStatus::Draft),
            "published" => Some(ArticleStatus::Published),
            "scheduled" => Some(ArticleStatus::Scheduled),
            _ => None,
        }
    }
}

/// A publishing destination, owned by the domain store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishingDomain {
    pub id: i64,
    pub name: String,
    pub hostname: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
}

/// The article row written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub category: String,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
    pub domain_id: i64,
    pub author_id: i64,
    pub source_url: String,
    pub source_name: String,
    pub is_parsed: bool,
    pub featured_image: Option<ImageRef>,
    pub gallery: Vec<ImageRef>,
    pub fake_views: u32,
    pub fake_likes: u32,
    pub quality: QualityFlag,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PublishedArticle {
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}
