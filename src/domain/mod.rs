pub mod article;
pub mod candidate;
pub mod content;
pub mod run;
pub mod source;

pub use article::{ArticleStatus, Author, PublishedArticle, PublishingDomain};
pub use candidate::{slugify, truncate_chars, ArticleCandidate};
pub use content::{ExtractedContent, ImageRef, QualityFlag};
pub use run::{CumulativeStats, RejectReason, RunMode, RunResult, RunStatus};
pub use source::{FetchMode, Source};
