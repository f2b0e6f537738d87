//! Candidate providers: where each search iteration gets its batch from.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::crawler::PageCrawler;
use crate::domain::{ArticleCandidate, Source};
use crate::fetcher::parallel::{merge_candidates, ParallelFetcher};
use crate::fetcher::session::{Session, SessionTiming};
use crate::normalizer::Normalizer;

/// One crawl session per site homepage, owned by a single run.
pub struct SessionPool {
    timing: SessionTiming,
    sessions: HashMap<String, Session>,
}

impl SessionPool {
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            timing,
            sessions: HashMap::new(),
        }
    }

    pub fn for_homepage(&mut self, homepage: &str) -> &mut Session {
        let timing = self.timing;
        self.sessions
            .entry(homepage.to_string())
            .or_insert_with(|| Session::new(timing))
    }
}

/// Candidates handed out for one search iteration.
#[derive(Debug, Default)]
pub struct Batch {
    pub candidates: Vec<ArticleCandidate>,
    /// No further call can yield new candidates.
    pub exhausted: bool,
    /// Source-level failures, isolated from the run.
    pub errors: Vec<String>,
}

pub enum Provider {
    Feed(FeedProvider),
    Page(PageProvider),
}

impl Provider {
    pub async fn next_batch(
        &mut self,
        batch_size: usize,
        seen: &HashSet<String>,
        sessions: &mut SessionPool,
    ) -> Batch {
        match self {
            Provider::Feed(feed) => feed.next_batch(batch_size, seen).await,
            Provider::Page(page) => page.next_batch(batch_size, seen, sessions).await,
        }
    }
}

/// Fetches every feed once per run and hands out the merged list in
/// priority order.
pub struct FeedProvider {
    parallel: ParallelFetcher,
    normalizer: Normalizer,
    sources: Vec<Source>,
    queue: Option<VecDeque<ArticleCandidate>>,
}

impl FeedProvider {
    pub fn new(parallel: ParallelFetcher, sources: Vec<Source>) -> Self {
        Self {
            parallel,
            normalizer: Normalizer::new(),
            sources,
            queue: None,
        }
    }

    async fn next_batch(&mut self, batch_size: usize, seen: &HashSet<String>) -> Batch {
        let mut errors = Vec::new();

        if self.queue.is_none() {
            let results = self
                .parallel
                .fetch_all(self.sources.clone(), &self.normalizer)
                .await;
            errors.extend(results.iter().filter_map(|r| r.error.clone()));

            let merged = merge_candidates(results);
            info!("Feeds yielded {} candidates", merged.len());
            self.queue = Some(merged.into());
        }

        let mut candidates = Vec::new();
        let mut exhausted = true;
        if let Some(queue) = self.queue.as_mut() {
            while candidates.len() < batch_size {
                let Some(candidate) = queue.pop_front() else {
                    break;
                };
                if !seen.contains(&candidate.source_url)
                    && !candidates
                        .iter()
                        .any(|c: &ArticleCandidate| c.source_url == candidate.source_url)
                {
                    candidates.push(candidate);
                }
            }
            exhausted = queue.is_empty();
        }

        Batch {
            candidates,
            exhausted,
            errors,
        }
    }
}

/// Crawls the listing pages of page-mode sources on every call.
pub struct PageProvider {
    crawler: PageCrawler,
    sources: Vec<Source>,
}

impl PageProvider {
    pub fn new(crawler: PageCrawler, sources: Vec<Source>) -> Self {
        Self { crawler, sources }
    }

    async fn next_batch(
        &mut self,
        batch_size: usize,
        seen: &HashSet<String>,
        sessions: &mut SessionPool,
    ) -> Batch {
        let mut candidates: Vec<ArticleCandidate> = Vec::new();
        let mut known = seen.clone();

        for source in &self.sources {
            if candidates.len() >= batch_size {
                break;
            }
            let session = sessions.for_homepage(&source.homepage());
            let found = self
                .crawler
                .discover_links(source, batch_size - candidates.len(), session, &known)
                .await;
            debug!("{} new links from {}", found.len(), source.name);

            for candidate in found {
                if known.insert(candidate.source_url.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        ArticleCandidate::sort_by_priority(&mut candidates);
        Batch {
            candidates,
            exhausted: self.sources.is_empty(),
            errors: Vec::new(),
        }
    }
}
