pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{
    ArticleStatus, Author, CumulativeStats, PublishedArticle, PublishingDomain, RunResult,
};

pub use sqlite::SqliteStore;

pub trait Store {
    // Publishing targets
    fn add_domain(&self, name: &str, hostname: &str) -> Result<i64>;
    fn list_domains(&self) -> Result<Vec<PublishingDomain>>;
    /// Active domains among `ids`, or every active domain when `ids` is empty.
    fn list_active_domains(&self, ids: &[i64]) -> Result<Vec<PublishingDomain>>;

    // Authors
    fn add_user(&self, username: &str) -> Result<i64>;
    fn get_user_by_id(&self, id: i64) -> Result<Option<Author>>;

    // Article operations
    fn find_by_title_or_slug_or_source_url(
        &self,
        title: &str,
        slug: &str,
        source_url: &str,
    ) -> Result<Option<i64>>;
    /// Fails with `DuplicateSlug` when the slug is taken.
    fn save_article(&self, article: &PublishedArticle) -> Result<i64>;
    fn get_article(&self, id: i64) -> Result<Option<PublishedArticle>>;
    fn count_by_status(&self, status: ArticleStatus) -> Result<i64>;

    // Run bookkeeping
    fn record_run(&self, run: &RunResult) -> Result<()>;
    fn cumulative_stats(&self) -> Result<CumulativeStats>;
    fn recent_runs(&self, limit: usize) -> Result<Vec<RunResult>>;

    // Scheduler clock, shared with processes that only read status
    fn set_next_run_at(&self, at: Option<DateTime<Utc>>) -> Result<()>;
    fn next_run_at(&self) -> Result<Option<DateTime<Utc>>>;
}
