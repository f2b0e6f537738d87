use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{FreshetError, Result};
use crate::domain::run::RUN_HISTORY_LIMIT;
use crate::domain::{
    ArticleStatus, Author, CumulativeStats, ImageRef, PublishedArticle, PublishingDomain,
    QualityFlag, RunMode, RunResult, RunStatus,
};
use crate::store::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FreshetError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            FreshetError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn row_to_domain(row: &Row<'_>) -> rusqlite::Result<PublishingDomain> {
        Ok(PublishingDomain {
            id: row.get(0)?,
            name: row.get(1)?,
            hostname: row.get(2)?,
            is_active: row.get(3)?,
        })
    }

    fn row_to_article(row: &Row<'_>) -> rusqlite::Result<PublishedArticle> {
        let tags: String = row.get(6)?;
        let featured: Option<String> = row.get(13)?;
        let gallery: String = row.get(14)?;
        let status: String = row.get(7)?;
        let quality: String = row.get(17)?;

        Ok(PublishedArticle {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            content: row.get(3)?,
            excerpt: row.get(4)?,
            category: row.get(5)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            status: ArticleStatus::parse(&status).unwrap_or(ArticleStatus::Draft),
            domain_id: row.get(8)?,
            author_id: row.get(9)?,
            source_url: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            source_name: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            is_parsed: row.get(12)?,
            featured_image: featured.and_then(|f| serde_json::from_str::<ImageRef>(&f).ok()),
            gallery: serde_json::from_str(&gallery).unwrap_or_default(),
            fake_views: row.get(15)?,
            fake_likes: row.get(16)?,
            quality: if quality == "degraded" {
                QualityFlag::Degraded
            } else {
                QualityFlag::Ok
            },
            published_at: row
                .get::<_, Option<String>>(18)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: row
                .get::<_, String>(19)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunResult> {
        let errors: String = row.get(9)?;
        let status: String = row.get(10)?;
        let mode: String = row.get(2)?;

        Ok(RunResult {
            started_at: row
                .get::<_, String>(0)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            finished_at: row
                .get::<_, Option<String>>(1)?
                .and_then(|s| Self::parse_datetime(&s)),
            mode: RunMode::parse(&mode).unwrap_or(RunMode::Feed),
            target: row.get::<_, i64>(3)? as usize,
            found: row.get::<_, i64>(4)? as usize,
            processed: row.get::<_, i64>(5)? as usize,
            succeeded: row.get::<_, i64>(6)? as usize,
            failed: row.get::<_, i64>(7)? as usize,
            duplicates: row.get::<_, i64>(8)? as usize,
            errors: serde_json::from_str(&errors).unwrap_or_default(),
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

const ARTICLE_COLUMNS: &str = "id, title, slug, content, excerpt, category, tags, status, domain_id, author_id,
     source_url, source_name, is_parsed, featured_image, gallery, fake_views, fake_likes, quality,
     published_at, created_at";

impl Store for SqliteStore {
    fn add_domain(&self, name: &str, hostname: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO domains (name, hostname, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![name, hostname, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_domains(&self) -> Result<Vec<PublishingDomain>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, hostname, is_active FROM domains ORDER BY id")?;
        let domains = stmt
            .query_map([], Self::row_to_domain)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(domains)
    }

    fn list_active_domains(&self, ids: &[i64]) -> Result<Vec<PublishingDomain>> {
        let conn = self.conn()?;
        let domains = if ids.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT id, name, hostname, is_active FROM domains WHERE is_active = 1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], Self::row_to_domain)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT id, name, hostname, is_active FROM domains
                 WHERE is_active = 1 AND id IN ({}) ORDER BY id",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), Self::row_to_domain)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        Ok(domains)
    }

    fn add_user(&self, username: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_user_by_id(&self, id: i64) -> Result<Option<Author>> {
        let conn = self.conn()?;
        let author = conn
            .query_row(
                "SELECT id, username FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Author {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(author)
    }

    fn find_by_title_or_slug_or_source_url(
        &self,
        title: &str,
        slug: &str,
        source_url: &str,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM articles WHERE title = ?1 OR slug = ?2 OR source_url = ?3 LIMIT 1",
                params![title, slug, source_url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn save_article(&self, article: &PublishedArticle) -> Result<i64> {
        let conn = self.conn()?;
        let featured = article
            .featured_image
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = conn.execute(
            "INSERT INTO articles (title, slug, content, excerpt, category, tags, status, domain_id,
                author_id, source_url, source_name, is_parsed, featured_image, gallery, fake_views,
                fake_likes, quality, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                article.title,
                article.slug,
                article.content,
                article.excerpt,
                article.category,
                serde_json::to_string(&article.tags)?,
                article.status.as_str(),
                article.domain_id,
                article.author_id,
                article.source_url,
                article.source_name,
                article.is_parsed,
                featured,
                serde_json::to_string(&article.gallery)?,
                article.fake_views,
                article.fake_likes,
                article.quality.as_str(),
                article.published_at.map(|dt| dt.to_rfc3339()),
                article.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(FreshetError::DuplicateSlug(article.slug.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn get_article(&self, id: i64) -> Result<Option<PublishedArticle>> {
        let conn = self.conn()?;
        let article = conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![id],
                Self::row_to_article,
            )
            .optional()?;
        Ok(article)
    }

    fn count_by_status(&self, status: ArticleStatus) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn record_run(&self, run: &RunResult) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO run_history (started_at, finished_at, mode, target, found, processed,
                succeeded, failed, duplicates, errors, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.started_at.to_rfc3339(),
                run.finished_at.map(|dt| dt.to_rfc3339()),
                run.mode.as_str(),
                run.target as i64,
                run.found as i64,
                run.processed as i64,
                run.succeeded as i64,
                run.failed as i64,
                run.duplicates as i64,
                serde_json::to_string(&run.errors)?,
                run.status.as_str(),
            ],
        )?;

        tx.execute(
            "DELETE FROM run_history WHERE id NOT IN
                (SELECT id FROM run_history ORDER BY id DESC LIMIT ?1)",
            params![RUN_HISTORY_LIMIT as i64],
        )?;

        tx.execute(
            "UPDATE parser_stats SET
                total_runs = total_runs + 1,
                total_found = total_found + ?1,
                total_succeeded = total_succeeded + ?2,
                total_failed = total_failed + ?3,
                total_duplicates = total_duplicates + ?4,
                last_run_at = ?5
             WHERE id = 1",
            params![
                run.found as i64,
                run.succeeded as i64,
                run.failed as i64,
                run.duplicates as i64,
                run.finished_at.unwrap_or(run.started_at).to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn cumulative_stats(&self) -> Result<CumulativeStats> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT total_runs, total_found, total_succeeded, total_failed, total_duplicates, last_run_at
             FROM parser_stats WHERE id = 1",
            [],
            |row| {
                Ok(CumulativeStats {
                    total_runs: row.get::<_, i64>(0)? as u64,
                    total_found: row.get::<_, i64>(1)? as u64,
                    total_succeeded: row.get::<_, i64>(2)? as u64,
                    total_failed: row.get::<_, i64>(3)? as u64,
                    total_duplicates: row.get::<_, i64>(4)? as u64,
                    last_run_at: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|s| Self::parse_datetime(&s)),
                })
            },
        )?;
        Ok(stats)
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT started_at, finished_at, mode, target, found, processed, succeeded, failed,
                    duplicates, errors, status
             FROM run_history ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn set_next_run_at(&self, at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE parser_stats SET next_run_at = ?1 WHERE id = 1",
            params![at.map(|dt| dt.to_rfc3339())],
        )?;
        Ok(())
    }

    fn next_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn.query_row(
            "SELECT next_run_at FROM parser_stats WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(raw.and_then(|s| Self::parse_datetime(&s)))
    }
}
