//! Run orchestration: search for candidates, extract, accept or reject,
//! and persist the run.
//!
//! ```text
//! idle → searching → extracting → accepted | rejected → (loop) → done
//! ```
//!
//! The search is a bounded loop. Each iteration asks the [`Provider`] for a
//! batch of unseen candidates; an empty batch widens the next request, and a
//! low acceptance rate widens it further. The run ends when the target is
//! met, the provider is exhausted, or the iteration budget runs out.

pub mod provider;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::{FreshetError, Result};
use crate::config::{Settings, SettingsProvider};
use crate::crawler::PageCrawler;
use crate::dedup::Deduplicator;
use crate::distribution::select_target;
use crate::domain::{
    slugify, ArticleCandidate, ArticleStatus, Author, ExtractedContent, FetchMode,
    PublishedArticle, PublishingDomain, RejectReason, RunMode, RunResult, Source,
};
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::session::SessionTiming;
use crate::fetcher::Fetcher;
use crate::scraper::{ContentExtractor, Extraction, ImageSaver};
use crate::store::Store;

pub use provider::{Batch, FeedProvider, PageProvider, Provider, SessionPool};

/// Search iterations per run.
pub const MAX_ITERATIONS: usize = 5;
/// Smallest first batch.
pub const MIN_BATCH: usize = 15;
/// Batches are never widened past this.
pub const MAX_BATCH: usize = 50;
/// Widening after an iteration that found nothing new.
pub const EMPTY_WIDEN: usize = 10;
/// Widening after an iteration with a poor acceptance rate.
pub const LOW_RATE_WIDEN: usize = 15;
/// Acceptance rate below which the next batch is widened.
pub const LOW_SUCCESS_RATE: f64 = 0.3;
/// Largest accepted per-run target.
pub const MAX_TARGET: usize = 50;

/// Per-run overrides of the configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub count: Option<usize>,
    pub use_feed_mode: Option<bool>,
}

enum Outcome {
    Accepted(i64),
    Duplicate,
    Rejected(RejectReason, Option<String>),
}

/// Everything a run resolves once up front.
struct RunContext {
    settings: Settings,
    mode: RunMode,
    extractor: ContentExtractor,
    images: ImageSaver,
    domains: Vec<PublishingDomain>,
    weights: Vec<u32>,
    author: Author,
    sources: Vec<Source>,
}

pub struct Pipeline<S: Store> {
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    settings: Arc<dyn SettingsProvider>,
    dedup: Deduplicator<S>,
    timing: SessionTiming,
}

impl<S: Store + Send + Sync + 'static> Pipeline<S> {
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self::with_timing(store, fetcher, settings, SessionTiming::default())
    }

    pub fn with_timing(
        store: Arc<S>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        settings: Arc<dyn SettingsProvider>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(store.clone()),
            store,
            fetcher,
            settings,
            timing,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &Arc<dyn SettingsProvider> {
        &self.settings
    }

    /// Execute one complete run and persist its result.
    ///
    /// Candidate and source failures are recorded in the returned
    /// [`RunResult`]. Only configuration errors propagate, after a failed
    /// result carrying the error has been persisted.
    pub async fn run(&self, options: RunOptions) -> Result<RunResult> {
        let settings = match self.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                let mode = run_mode(options.use_feed_mode.unwrap_or(true));
                let run = RunResult::start(options.count.unwrap_or(0), mode);
                return Err(self.abort(run, e.to_string()));
            }
        };

        let mode = run_mode(options.use_feed_mode.unwrap_or(settings.parser.use_feed_mode));
        let target = options
            .count
            .unwrap_or(settings.parser.articles_per_run)
            .clamp(1, MAX_TARGET);
        let mut run = RunResult::start(target, mode);
        info!(mode = mode.as_str(), target, "Run started");
        self.fetcher.set_timeout(settings.parser.request_timeout());

        let ctx = match self.resolve(settings, mode) {
            Ok(ctx) => ctx,
            Err(FreshetError::Config(msg)) => return Err(self.abort(run, msg)),
            Err(e) => {
                run.abort(e.to_string());
                if let Err(record) = self.store.record_run(&run) {
                    error!("Failed to record aborted run: {}", record);
                }
                return Err(e);
            }
        };

        self.search(&ctx, &mut run).await;
        run.finish();

        info!(
            status = run.status.as_str(),
            found = run.found,
            processed = run.processed,
            succeeded = run.succeeded,
            failed = run.failed,
            duplicates = run.duplicates,
            "Run finished in {:.1}s",
            run.elapsed_secs()
        );

        if let Err(e) = self.store.record_run(&run) {
            error!("Failed to record run: {}", e);
        }
        Ok(run)
    }

    fn resolve(&self, settings: Settings, mode: RunMode) -> Result<RunContext> {
        let domains = self
            .store
            .list_active_domains(&settings.publishing.domain_ids)?;
        if domains.is_empty() {
            return Err(FreshetError::Config("no active publishing domains".into()));
        }

        let author = match settings.publishing.author_id {
            Some(id) => self
                .store
                .get_user_by_id(id)?
                .ok_or_else(|| FreshetError::Config(format!("author {} does not exist", id)))?,
            None => {
                return Err(FreshetError::Config(
                    "publishing.author_id is not set".into(),
                ))
            }
        };

        let wanted = match mode {
            RunMode::Feed => FetchMode::Feed,
            RunMode::Page => FetchMode::Page,
        };
        let sources: Vec<Source> = settings
            .sources
            .iter()
            .filter(|s| s.mode == wanted)
            .cloned()
            .collect();

        let weights = domains
            .iter()
            .map(|d| settings.publishing.weight_for(d.id))
            .collect();

        Ok(RunContext {
            extractor: ContentExtractor::new(settings.scraper.clone(), &settings.content),
            images: ImageSaver::from_settings(&settings.content),
            mode,
            domains,
            weights,
            author,
            sources,
            settings,
        })
    }

    /// Persist a failed run and turn the message into a configuration error.
    fn abort(&self, mut run: RunResult, message: String) -> FreshetError {
        warn!("config_error: {}", message);
        run.abort(format!("config_error: {}", message));
        if let Err(e) = self.store.record_run(&run) {
            error!("Failed to record aborted run: {}", e);
        }
        FreshetError::Config(message)
    }

    fn provider(&self, ctx: &RunContext) -> Provider {
        let parser = &ctx.settings.parser;
        match ctx.mode {
            RunMode::Feed => Provider::Feed(FeedProvider::new(
                ParallelFetcher::with_workers(self.fetcher.clone(), parser.feed_workers),
                ctx.sources.clone(),
            )),
            RunMode::Page => Provider::Page(PageProvider::new(
                PageCrawler::with_listing_delay(self.fetcher.clone(), parser.listing_delay()),
                ctx.sources.clone(),
            )),
        }
    }

    async fn search(&self, ctx: &RunContext, run: &mut RunResult) {
        let lifetime_successes = match self.store.cumulative_stats() {
            Ok(stats) => stats.total_succeeded,
            Err(e) => {
                warn!("Could not read lifetime stats: {}", e);
                0
            }
        };

        let mut provider = self.provider(ctx);
        let mut sessions = SessionPool::new(self.timing);
        let mut seen: HashSet<String> = HashSet::new();
        let mut batch_size = (run.target * 2).max(MIN_BATCH);
        let mut extracted_any = false;

        for iteration in 1..=MAX_ITERATIONS {
            debug!(iteration, batch_size, "Searching for candidates");
            let batch = provider.next_batch(batch_size, &seen, &mut sessions).await;
            for e in batch.errors {
                run.push_error(e);
            }

            let fresh: Vec<ArticleCandidate> = batch
                .candidates
                .into_iter()
                .filter(|c| seen.insert(c.source_url.clone()))
                .collect();

            if fresh.is_empty() {
                if batch.exhausted {
                    info!("No more candidates");
                    break;
                }
                batch_size = widen(batch_size, EMPTY_WIDEN);
                continue;
            }
            run.found += fresh.len();

            for candidate in &fresh {
                if run.target_met() {
                    break;
                }
                run.processed += 1;

                match self.dedup.is_duplicate(candidate) {
                    Ok(true) => {
                        run.duplicates += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        run.record_failure(RejectReason::SaveError, &candidate.title, Some(&e.to_string()));
                        continue;
                    }
                }

                if extracted_any {
                    tokio::time::sleep(ctx.settings.parser.request_delay()).await;
                }
                extracted_any = true;

                let counter = lifetime_successes + run.succeeded as u64;
                match self.accept(ctx, candidate, &mut sessions, counter).await {
                    Outcome::Accepted(id) => {
                        run.succeeded += 1;
                        info!(article_id = id, url = %candidate.source_url, "Article accepted");
                    }
                    Outcome::Duplicate => {
                        run.duplicates += 1;
                        debug!("Duplicate at save: {}", candidate.source_url);
                    }
                    Outcome::Rejected(reason, detail) => {
                        info!(reason = reason.as_str(), url = %candidate.source_url, "Candidate rejected");
                        run.record_failure(reason, &candidate.title, detail.as_deref());
                    }
                }
            }

            if run.target_met() || batch.exhausted {
                break;
            }
            if run.success_rate() < LOW_SUCCESS_RATE {
                batch_size = widen(batch_size, LOW_RATE_WIDEN);
            }
            if iteration < MAX_ITERATIONS {
                tokio::time::sleep(ctx.settings.parser.iteration_delay()).await;
            }
        }
    }

    async fn accept(
        &self,
        ctx: &RunContext,
        candidate: &ArticleCandidate,
        sessions: &mut SessionPool,
        success_counter: u64,
    ) -> Outcome {
        let source = ctx.sources.iter().find(|s| s.name == candidate.source_name);
        let homepage = source
            .map(Source::homepage)
            .unwrap_or_else(|| origin_of(&candidate.source_url));
        let session = sessions.for_homepage(&homepage);

        let mut content = match ctx.mode {
            RunMode::Feed => {
                ctx.extractor
                    .extract_feed(self.fetcher.as_ref(), session, candidate, &homepage)
                    .await
            }
            RunMode::Page => {
                let listing = source
                    .map(|s| s.fetch_url.clone())
                    .unwrap_or_else(|| homepage.clone());
                match ctx
                    .extractor
                    .extract_page(self.fetcher.as_ref(), session, candidate, &listing, &homepage)
                    .await
                {
                    Ok(Extraction::Accepted(content)) => content,
                    Ok(Extraction::TooShort { length }) => {
                        return Outcome::Rejected(
                            RejectReason::TooShort,
                            Some(format!("{} chars", length)),
                        )
                    }
                    Err(e) => return Outcome::Rejected(RejectReason::ParseError, Some(e.to_string())),
                }
            }
        };
        let user_agent = session.user_agent().to_string();

        if content.is_degraded() {
            info!("degraded_quality: {}", candidate.source_url);
        }

        let title = content
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| candidate.title.clone());
        if ctx.mode == RunMode::Page {
            match self.dedup.is_duplicate_title(&title, &candidate.source_url) {
                Ok(true) => return Outcome::Duplicate,
                Ok(false) => {}
                Err(e) => return Outcome::Rejected(RejectReason::SaveError, Some(e.to_string())),
            }
        }
        let slug = slugify(&title);

        let domain = select_target(
            &ctx.domains,
            &ctx.weights,
            ctx.settings.publishing.strategy,
            success_counter,
            &mut rand::rng(),
        )
        .cloned();
        let Some(domain) = domain else {
            return Outcome::Rejected(RejectReason::SaveError, Some("no publishing domain".into()));
        };

        if ctx.settings.content.save_images {
            ctx.images
                .persist_all(self.fetcher.as_ref(), &mut content, &slug, &user_agent)
                .await;
        }

        let article = build_article(ctx, candidate, content, title, slug, &domain);
        match self.store.save_article(&article) {
            Ok(id) => Outcome::Accepted(id),
            Err(FreshetError::DuplicateSlug(_)) => Outcome::Duplicate,
            Err(e) => Outcome::Rejected(RejectReason::SaveError, Some(e.to_string())),
        }
    }
}

fn run_mode(use_feed_mode: bool) -> RunMode {
    if use_feed_mode {
        RunMode::Feed
    } else {
        RunMode::Page
    }
}

fn widen(batch_size: usize, step: usize) -> usize {
    if batch_size >= MAX_BATCH {
        batch_size
    } else {
        (batch_size + step).min(MAX_BATCH)
    }
}

fn origin_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(url) => format!("{}/", url.origin().ascii_serialization()),
        Err(_) => url.to_string(),
    }
}

fn build_article(
    ctx: &RunContext,
    candidate: &ArticleCandidate,
    content: ExtractedContent,
    title: String,
    slug: String,
    domain: &PublishingDomain,
) -> PublishedArticle {
    let publishing = &ctx.settings.publishing;
    let stats = &ctx.settings.initial_stats;
    let mut rng = rand::rng();
    let now = Utc::now();

    let (status, published_at) = match ctx.mode {
        RunMode::Feed => (ArticleStatus::Published, Some(candidate.published_at)),
        RunMode::Page => {
            let status = publishing.default_status;
            let published_at = (status == ArticleStatus::Published)
                .then(|| content.published_at.unwrap_or(now));
            (status, published_at)
        }
    };

    let tags = if !content.extracted_tags.is_empty() {
        content.extracted_tags
    } else if !candidate.tags.is_empty() {
        candidate.tags.clone()
    } else {
        publishing.default_tags.clone()
    };

    let featured_image = content.featured_image.map(|mut image| {
        if image.alt.trim().is_empty() {
            image.alt = title.clone();
        }
        image
    });

    PublishedArticle {
        id: 0,
        excerpt: content
            .excerpt
            .unwrap_or_else(|| candidate.excerpt.clone()),
        title,
        slug,
        content: content.html_body,
        category: publishing.category.clone(),
        tags,
        status,
        domain_id: domain.id,
        author_id: ctx.author.id,
        source_url: candidate.source_url.clone(),
        source_name: candidate.source_name.clone(),
        is_parsed: true,
        featured_image,
        gallery: content.gallery,
        fake_views: stats.views.pick(&mut rng),
        fake_likes: stats.likes.pick(&mut rng),
        quality: content.quality,
        published_at,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StatRange, StaticSettings};
    use crate::distribution::Strategy;
    use crate::domain::{QualityFlag, RunStatus};
    use crate::fetcher::stub::StubFetcher;
    use crate::store::SqliteStore;
    use std::time::Duration;

    fn body_text(topic: &str) -> String {
        format!(
            "{} markets moved sharply today as traders reacted to fresh data from the exchanges. ",
            topic
        )
        .repeat(8)
    }

    fn article_html(topic: &str) -> String {
        format!(
            r#"<html><head><title>{topic}</title></head><body>
               <h1>{topic} in depth coverage</h1>
               <div class="post-content"><p>{}</p></div>
               </body></html>"#,
            body_text(topic)
        )
    }

    fn rss(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{}</title><link>{}</link><description>{} summary text</description>\
                     <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate></item>",
                    title, link, title
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{}</channel></rss>"#,
            items
        )
    }

    fn base_settings(sources: Vec<Source>, author_id: i64) -> Settings {
        let mut settings = Settings::default();
        settings.sources = sources;
        settings.parser.request_delay_ms = 0;
        settings.parser.iteration_delay_ms = 0;
        settings.parser.listing_delay_ms = 0;
        settings.content.save_images = false;
        settings.publishing.author_id = Some(author_id);
        settings
    }

    struct Harness {
        store: Arc<SqliteStore>,
        fetcher: Arc<StubFetcher>,
        pipeline: Pipeline<SqliteStore>,
        settings: Arc<StaticSettings>,
    }

    fn harness(fetcher: StubFetcher, sources: Vec<Source>, domains: usize) -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for i in 0..domains {
            store
                .add_domain(&format!("Domain {}", i), &format!("d{}.example.com", i))
                .unwrap();
        }
        let author_id = store.add_user("editor").unwrap();
        let settings = Arc::new(StaticSettings::new(base_settings(sources, author_id)));
        let fetcher = Arc::new(fetcher);
        let pipeline = Pipeline::with_timing(
            store.clone(),
            fetcher.clone(),
            settings.clone(),
            SessionTiming::immediate(),
        );
        Harness {
            store,
            fetcher,
            pipeline,
            settings,
        }
    }

    fn feed_source(name: &str, host: &str, weight: u32) -> Source {
        Source::feed(
            name,
            &format!("https://{}/feed", host),
            &format!("https://{}", host),
            weight,
        )
    }

    fn assert_counters(run: &RunResult) {
        assert!(run.succeeded + run.failed + run.duplicates <= run.processed);
        assert!(run.processed <= run.found);
    }

    #[tokio::test]
    async fn test_feed_run_meets_target() {
        let fetcher = StubFetcher::new()
            .html(
                "https://a.example.com/feed",
                &rss(&[
                    ("Bitcoin rallies again", "https://a.example.com/1"),
                    ("Ether upgrade lands", "https://a.example.com/2"),
                    ("Solana fees drop", "https://a.example.com/3"),
                ]),
            )
            .html("https://a.example.com/1", &article_html("Bitcoin"))
            .html("https://a.example.com/2", &article_html("Ether"))
            .html("https://a.example.com/3", &article_html("Solana"));
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 1);

        let run = h
            .pipeline
            .run(RunOptions {
                count: Some(2),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.succeeded, 2);
        assert_eq!(run.found, 3);
        assert_counters(&run);
        assert_eq!(h.store.count_by_status(ArticleStatus::Published).unwrap(), 2);
        // The third candidate is never extracted once the target is met.
        assert_eq!(h.fetcher.request_count("https://a.example.com/3"), 0);

        let saved = h.store.get_article(1).unwrap().unwrap();
        assert!(saved.is_parsed);
        assert_eq!(saved.category, "Crypto");
        assert_eq!(saved.quality, QualityFlag::Ok);
        assert!(saved.content.contains("markets moved sharply"));
        assert_eq!(h.store.recent_runs(5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_run_with_duplicates() {
        let fetcher = StubFetcher::new()
            .html(
                "https://a.example.com/feed",
                &rss(&[
                    ("Bitcoin rallies again", "https://a.example.com/1"),
                    ("Ether upgrade lands", "https://a.example.com/2"),
                    ("Story without a page", "https://a.example.com/3"),
                ]),
            )
            .html("https://a.example.com/1", &article_html("Bitcoin"))
            .html("https://a.example.com/2", &article_html("Ether"));
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 1);

        // The first run publishes /1, the second sees it again as a duplicate.
        let first = h
            .pipeline
            .run(RunOptions {
                count: Some(1),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(first.succeeded, 1);

        let run = h
            .pipeline
            .run(RunOptions {
                count: Some(3),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();

        assert_eq!(run.succeeded, 2);
        assert_eq!(run.status, RunStatus::Partial);
        assert!(run.duplicates >= 1);
        assert_counters(&run);

        let stats = h.store.cumulative_stats().unwrap();
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.total_succeeded, 3);
    }

    #[tokio::test]
    async fn test_blocked_article_is_degraded() {
        let blocked = r#"<html><body><div class="post-content"><p>Please enable JavaScript
            to view this page. Please enable JavaScript and cookies to continue.</p></div></body></html>"#;
        let fetcher = StubFetcher::new()
            .html(
                "https://a.example.com/feed",
                &rss(&[("Bitcoin rallies again", "https://a.example.com/1")]),
            )
            .html("https://a.example.com/1", blocked);
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 1);

        let run = h
            .pipeline
            .run(RunOptions {
                count: Some(1),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();

        assert_eq!(run.succeeded, 1);
        let saved = h.store.get_article(1).unwrap().unwrap();
        assert_eq!(saved.quality, QualityFlag::Degraded);
        assert!(saved.content.starts_with("<p><strong>Summary:</strong></p>"));
        assert!(saved.content.contains("href=\"https://a.example.com/1\""));
        assert!(!saved.content.contains("enable JavaScript"));
    }

    #[tokio::test]
    async fn test_all_sources_down() {
        let fetcher = StubFetcher::new()
            .fail("https://a.example.com/feed", "timed out")
            .fail("https://b.example.com/feed", "timed out");
        let h = harness(
            fetcher,
            vec![
                feed_source("A", "a.example.com", 1),
                feed_source("B", "b.example.com", 1),
            ],
            1,
        );

        let run = h.pipeline.run(RunOptions::default()).await.unwrap();

        assert_eq!(run.found, 0);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.errors.len(), 2);
        assert_eq!(h.store.count_by_status(ArticleStatus::Published).unwrap(), 0);
        assert_eq!(h.store.recent_runs(5).unwrap()[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_heavier_source_wins_duplicate_race() {
        let fetcher = StubFetcher::new()
            .html(
                "https://light.example.com/feed",
                &rss(&[("Bitcoin ETF approved", "https://light.example.com/etf")]),
            )
            .html(
                "https://heavy.example.com/feed",
                &rss(&[("Bitcoin ETF approved", "https://heavy.example.com/etf")]),
            )
            .html("https://light.example.com/etf", &article_html("Light"))
            .html("https://heavy.example.com/etf", &article_html("Heavy"));
        let h = harness(
            fetcher,
            vec![
                feed_source("Light", "light.example.com", 1),
                feed_source("Heavy", "heavy.example.com", 3),
            ],
            1,
        );

        let run = h
            .pipeline
            .run(RunOptions {
                count: Some(2),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();

        assert_eq!(run.succeeded, 1);
        assert_eq!(run.duplicates, 1);
        let saved = h.store.get_article(1).unwrap().unwrap();
        assert_eq!(saved.source_name, "Heavy");
        assert_eq!(h.fetcher.request_count("https://light.example.com/etf"), 0);
    }

    #[tokio::test]
    async fn test_round_robin_continues_lifetime_counter() {
        let items: Vec<(String, String)> = (0..4)
            .map(|i| {
                (
                    format!("Story number {} about markets", i),
                    format!("https://a.example.com/{}", i),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = items.iter().map(|(t, l)| (t.as_str(), l.as_str())).collect();
        let mut fetcher = StubFetcher::new().html("https://a.example.com/feed", &rss(&refs));
        for (_, link) in &items {
            fetcher = fetcher.html(link, &article_html("Markets"));
        }
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 2);
        h.settings.update(|s| s.publishing.strategy = Strategy::RoundRobin);

        h.pipeline
            .run(RunOptions {
                count: Some(1),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();
        h.pipeline
            .run(RunOptions {
                count: Some(3),
                use_feed_mode: Some(true),
            })
            .await
            .unwrap();

        let domains: Vec<i64> = (1..=4)
            .map(|id| h.store.get_article(id).unwrap().unwrap().domain_id)
            .collect();
        assert_eq!(domains, vec![1, 2, 1, 2]);
    }

    #[tokio::test]
    async fn test_page_run_rejects_short_articles() {
        let listing = r#"<html><body>
            <article><a href="/news/bitcoin-long-story-here">Bitcoin long story here for readers</a></article>
            <article><a href="/news/ether-short-story-here">Ether short story here for readers</a></article>
            </body></html>"#;
        let long_page = format!(
            r#"<html><body><h1 class="article-title">Bitcoin long story, full text</h1>
               <div class="post-content"><p>{}</p></div>
               <div class="tags"><a>bitcoin</a><a>markets</a></div></body></html>"#,
            body_text("Bitcoin")
        );
        let short_page = r#"<html><body><h1>Ether short story</h1>
            <div class="post-content"><p>Too little text here.</p></div></body></html>"#;

        let fetcher = StubFetcher::new()
            .html("https://page.example.com/news", listing)
            .html("https://page.example.com/news/bitcoin-long-story-here", &long_page)
            .html("https://page.example.com/news/ether-short-story-here", short_page);
        let source = Source::page(
            "Page",
            "https://page.example.com/news",
            "https://page.example.com",
            1,
        );
        let h = harness(fetcher, vec![source], 1);
        h.settings.update(|s| s.publishing.default_status = ArticleStatus::Draft);

        let run = h
            .pipeline
            .run(RunOptions {
                count: Some(2),
                use_feed_mode: Some(false),
            })
            .await
            .unwrap();

        assert_eq!(run.succeeded, 1);
        assert!(run.failed >= 1);
        assert!(run.errors.iter().any(|e| e.contains("too_short")));
        assert_counters(&run);

        let saved = h.store.get_article(1).unwrap().unwrap();
        assert_eq!(saved.title, "Bitcoin long story, full text");
        assert_eq!(saved.slug, "bitcoin-long-story-full-text");
        assert_eq!(saved.status, ArticleStatus::Draft);
        assert!(saved.published_at.is_none());
        assert_eq!(saved.tags, vec!["bitcoin", "markets"]);
        assert!(saved.excerpt.ends_with("..."));
    }

    #[tokio::test]
    async fn test_no_active_domains_aborts() {
        let h = harness(StubFetcher::new(), vec![feed_source("A", "a.example.com", 1)], 0);

        let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, FreshetError::Config(_)));

        let runs = h.store.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].errors[0].starts_with("config_error"));
        assert_eq!(h.fetcher.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_unknown_author_aborts() {
        let h = harness(StubFetcher::new(), vec![feed_source("A", "a.example.com", 1)], 1);
        h.settings.update(|s| s.publishing.author_id = Some(999));

        let err = h.pipeline.run(RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, FreshetError::Config(ref m) if m.contains("999")));
        assert_eq!(h.store.cumulative_stats().unwrap().total_runs, 1);
    }

    #[tokio::test]
    async fn test_initial_stats_within_range() {
        let fetcher = StubFetcher::new()
            .html(
                "https://a.example.com/feed",
                &rss(&[("Bitcoin rallies again", "https://a.example.com/1")]),
            )
            .html("https://a.example.com/1", &article_html("Bitcoin"));
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 1);
        h.settings.update(|s| {
            s.initial_stats.views = StatRange::new(100, 200);
            s.initial_stats.likes = StatRange::new(7, 3);
        });

        h.pipeline.run(RunOptions::default()).await.unwrap();

        let saved = h.store.get_article(1).unwrap().unwrap();
        assert!((100..=200).contains(&saved.fake_views));
        assert_eq!(saved.fake_likes, 7);
    }

    #[test]
    fn test_widen_caps() {
        assert_eq!(widen(15, EMPTY_WIDEN), 25);
        assert_eq!(widen(45, LOW_RATE_WIDEN), MAX_BATCH);
        assert_eq!(widen(100, EMPTY_WIDEN), 100);
    }

    #[tokio::test]
    async fn test_request_timeout_follows_settings_each_run() {
        let fetcher = StubFetcher::new().fail("https://a.example.com/feed", "timed out");
        let h = harness(fetcher, vec![feed_source("A", "a.example.com", 1)], 1);

        h.pipeline.run(RunOptions::default()).await.unwrap();
        assert_eq!(h.fetcher.timeout(), Some(Duration::from_secs(30)));

        h.settings.update(|s| s.parser.request_timeout_secs = 5);
        h.pipeline.run(RunOptions::default()).await.unwrap();
        assert_eq!(h.fetcher.timeout(), Some(Duration::from_secs(5)));
    }

    /// Store whose duplicate lookup never matches, leaving the slug
    /// constraint as the only guard.
    struct LookupMissStore(SqliteStore);

    impl Store for LookupMissStore {
        fn add_domain(&self, name: &str, hostname: &str) -> Result<i64> {
            self.0.add_domain(name, hostname)
        }
        fn list_domains(&self) -> Result<Vec<PublishingDomain>> {
            self.0.list_domains()
        }
        fn list_active_domains(&self, ids: &[i64]) -> Result<Vec<PublishingDomain>> {
            self.0.list_active_domains(ids)
        }
        fn add_user(&self, username: &str) -> Result<i64> {
            self.0.add_user(username)
        }
        fn get_user_by_id(&self, id: i64) -> Result<Option<crate::domain::Author>> {
            self.0.get_user_by_id(id)
        }
        fn find_by_title_or_slug_or_source_url(&self, _: &str, _: &str, _: &str) -> Result<Option<i64>> {
            Ok(None)
        }
        fn save_article(&self, article: &PublishedArticle) -> Result<i64> {
            self.0.save_article(article)
        }
        fn get_article(&self, id: i64) -> Result<Option<PublishedArticle>> {
            self.0.get_article(id)
        }
        fn count_by_status(&self, status: ArticleStatus) -> Result<i64> {
            self.0.count_by_status(status)
        }
        fn record_run(&self, run: &RunResult) -> Result<()> {
            self.0.record_run(run)
        }
        fn cumulative_stats(&self) -> Result<crate::domain::CumulativeStats> {
            self.0.cumulative_stats()
        }
        fn recent_runs(&self, limit: usize) -> Result<Vec<RunResult>> {
            self.0.recent_runs(limit)
        }
        fn set_next_run_at(&self, at: Option<chrono::DateTime<Utc>>) -> Result<()> {
            self.0.set_next_run_at(at)
        }
        fn next_run_at(&self) -> Result<Option<chrono::DateTime<Utc>>> {
            self.0.next_run_at()
        }
    }

    #[tokio::test]
    async fn test_slug_collision_at_save_counts_as_duplicate() {
        let store = Arc::new(LookupMissStore(SqliteStore::in_memory().unwrap()));
        store.add_domain("Main", "main.example.com").unwrap();
        let author_id = store.add_user("editor").unwrap();

        let fetcher = StubFetcher::new()
            .html(
                "https://a.example.com/feed",
                &rss(&[("Bitcoin rallies again", "https://a.example.com/1")]),
            )
            .html("https://a.example.com/1", &article_html("Bitcoin"));
        let settings = Arc::new(StaticSettings::new(base_settings(
            vec![feed_source("A", "a.example.com", 1)],
            author_id,
        )));
        let pipeline = Pipeline::with_timing(
            store.clone(),
            Arc::new(fetcher),
            settings,
            SessionTiming::immediate(),
        );
        let options = RunOptions {
            count: Some(1),
            use_feed_mode: Some(true),
        };

        let first = pipeline.run(options).await.unwrap();
        assert_eq!(first.succeeded, 1);

        let second = pipeline.run(options).await.unwrap();
        assert_eq!(second.processed, 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(second.succeeded, 0);
        assert!(second.errors.is_empty());
        assert_eq!(store.count_by_status(ArticleStatus::Published).unwrap(), 1);
    }
}

