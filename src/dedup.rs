use std::sync::Arc;

use tracing::debug;

use crate::app::Result;
use crate::domain::{slugify, ArticleCandidate};
use crate::store::Store;

/// Checks candidates against articles already in the store.
///
/// This is a pre-check only. The slug UNIQUE constraint still rejects a
/// racing insert at save time.
pub struct Deduplicator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Deduplicator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// True when an article shares the candidate's title, slug or source URL.
    pub fn is_duplicate(&self, candidate: &ArticleCandidate) -> Result<bool> {
        let existing = self.store.find_by_title_or_slug_or_source_url(
            &candidate.title,
            &candidate.slug,
            &candidate.source_url,
        )?;

        if let Some(id) = existing {
            debug!(url = %candidate.source_url, article_id = id, "Duplicate candidate");
        }
        Ok(existing.is_some())
    }

    /// Re-check with the title read from the article page.
    pub fn is_duplicate_title(&self, title: &str, source_url: &str) -> Result<bool> {
        let existing = self
            .store
            .find_by_title_or_slug_or_source_url(title, &slugify(title), source_url)?;
        Ok(existing.is_some())
    }
}
