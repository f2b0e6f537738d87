use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::app::Result;
use crate::domain::{ArticleCandidate, Source};
use crate::fetcher::Fetcher;
use crate::normalizer::Normalizer;

pub const DEFAULT_WORKERS: usize = 10;

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml";

/// Outcome of fetching one feed. A failed source carries an error and no candidates.
#[derive(Debug, Clone)]
pub struct FeedResult {
    pub source_name: String,
    pub candidates: Vec<ArticleCandidate>,
    pub error: Option<String>,
}

pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Fetch every source concurrently. Results keep source order.
    pub async fn fetch_all(&self, sources: Vec<Source>, normalizer: &Normalizer) -> Vec<FeedResult> {
        let mut handles = Vec::new();
        let names: Vec<String> = sources.iter().map(|s| s.name.clone()).collect();

        for source in sources {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let normalizer = normalizer.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FeedResult {
                            source_name: source.name.clone(),
                            candidates: Vec::new(),
                            error: Some("fetch pool closed".to_string()),
                        }
                    }
                };

                match fetch_single_feed(&fetcher, &source, &normalizer).await {
                    Ok(candidates) => {
                        tracing::info!("Found {} items in {}", candidates.len(), source.name);
                        FeedResult {
                            source_name: source.name,
                            candidates,
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Feed {} failed: {}", source.name, e);
                        FeedResult {
                            error: Some(format!("{}: {}", source.name, e)),
                            source_name: source.name,
                            candidates: Vec::new(),
                        }
                    }
                }
            });

            handles.push(handle);
        }

        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, source_name)| match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Feed task for {} failed: {}", source_name, e);
                    FeedResult {
                        error: Some(format!("{}: {}", source_name, e)),
                        source_name,
                        candidates: Vec::new(),
                    }
                }
            })
            .collect()
    }
}

async fn fetch_single_feed(
    fetcher: &Arc<dyn Fetcher + Send + Sync>,
    source: &Source,
    normalizer: &Normalizer,
) -> Result<Vec<ArticleCandidate>> {
    let headers = vec![("Accept".to_string(), FEED_ACCEPT.to_string())];
    let body = fetcher
        .fetch(&source.fetch_url, &headers)
        .await?
        .into_body(&source.fetch_url)?;

    normalizer.normalize(source, &body, Utc::now())
}

/// Flatten feed results into one priority-ordered candidate list.
pub fn merge_candidates(results: Vec<FeedResult>) -> Vec<ArticleCandidate> {
    let mut candidates: Vec<ArticleCandidate> =
        results.into_iter().flat_map(|r| r.candidates).collect();
    ArticleCandidate::sort_by_priority(&mut candidates);
    candidates
}
