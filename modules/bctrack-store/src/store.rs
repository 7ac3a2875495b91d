use std::str::FromStr;

use bctrack_common::{Result, SortOrder, SourceKind};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::warn;
use uuid::Uuid;

pub struct Store {
    pub(crate) pool: SqlitePool,
}

/// Parameters for upserting a post.
pub struct InsertPost {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub created_utc: i64,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
    pub sort_order: SortOrder,
    pub crosspost_parent: Option<String>,
    pub sentiment: Option<f64>,
    pub engagement: f64,
    pub lexicon_version: i64,
}

/// Parameters for upserting a comment.
pub struct InsertComment {
    pub id: String,
    pub post_id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: i64,
    pub sentiment: Option<f64>,
    pub lexicon_version: i64,
}

/// One scrape_runs row: the outcome of one source within one cycle.
pub struct InsertRun {
    pub cycle_id: Uuid,
    pub source: String,
    pub post_count: i64,
    pub new_posts: i64,
    pub error_count: i64,
}

/// One scrape_errors row.
pub struct InsertError {
    pub source: Option<String>,
    pub error_kind: String,
    pub message: String,
    pub record_kind: Option<String>,
    pub record_id: Option<String>,
}

/// A post whose comment tree has not been walked yet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingComments {
    pub post_id: String,
    pub permalink: String,
    pub is_crosspost: bool,
}

/// A post enriched against an older lexicon, due for backfill.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StalePost {
    pub id: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaleComment {
    pub id: String,
    pub post_id: String,
    pub body: String,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open the database, creating the file if needed. WAL keeps readers
    /// live while the single-writer pipeline commits.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| bctrack_common::TrackerError::Database(e.into()))?;
        Ok(())
    }

    /// Upsert a post keyed on its source id. Returns true when the row is
    /// new. On conflict only the mutable fields change: score, comment
    /// count, sentiment, lexicon version; engagement keeps its historical
    /// maximum and a 'hot' sighting permanently upgrades the sort tag.
    /// `comments_fetched` and `first_seen` are never touched.
    pub async fn upsert_post(&self, p: &InsertPost) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)")
                .bind(&p.id)
                .fetch_one(&self.pool)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, source, title, body, created_utc, score, num_comments,
                 permalink, sort_order, crosspost_parent, sentiment,
                 engagement, lexicon_version, first_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                num_comments = excluded.num_comments,
                sentiment = excluded.sentiment,
                engagement = MAX(posts.engagement, excluded.engagement),
                sort_order = CASE WHEN excluded.sort_order = 'hot'
                                  THEN 'hot' ELSE posts.sort_order END,
                lexicon_version = excluded.lexicon_version
            "#,
        )
        .bind(&p.id)
        .bind(&p.source)
        .bind(&p.title)
        .bind(&p.body)
        .bind(p.created_utc)
        .bind(p.score)
        .bind(p.num_comments)
        .bind(&p.permalink)
        .bind(p.sort_order.as_str())
        .bind(&p.crosspost_parent)
        .bind(p.sentiment)
        .bind(p.engagement)
        .bind(p.lexicon_version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(!exists)
    }

    /// Upsert a comment. On conflict only score, sentiment, and lexicon
    /// version change. Returns true when the row is new.
    pub async fn upsert_comment(&self, c: &InsertComment) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)")
                .bind(&c.id)
                .fetch_one(&self.pool)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO comments
                (id, post_id, body, author, score, created_utc, sentiment,
                 lexicon_version, first_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                score = excluded.score,
                sentiment = excluded.sentiment,
                lexicon_version = excluded.lexicon_version
            "#,
        )
        .bind(&c.id)
        .bind(&c.post_id)
        .bind(&c.body)
        .bind(&c.author)
        .bind(c.score)
        .bind(c.created_utc)
        .bind(c.sentiment)
        .bind(c.lexicon_version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(!exists)
    }

    /// Attach method mentions to a post. Duplicates are ignored; returns
    /// the number of rows actually inserted.
    pub async fn insert_mentions(&self, post_id: &str, methods: &[&str]) -> Result<u64> {
        let mut inserted = 0;
        for method in methods {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO mentions (post_id, method) VALUES (?1, ?2)",
            )
            .bind(post_id)
            .bind(method)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Attach side effects to a post or comment. Duplicates are ignored.
    pub async fn insert_side_effects(
        &self,
        kind: SourceKind,
        source_id: &str,
        effects: &[&str],
    ) -> Result<u64> {
        let mut inserted = 0;
        for effect in effects {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO side_effects (source_kind, source_id, effect)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(kind.as_str())
            .bind(source_id)
            .bind(effect)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Set the comments_fetched flag. The flag only ever goes from 0 to 1.
    pub async fn mark_comments_fetched(&self, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET comments_fetched = 1 WHERE id = ?1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append one scrape_runs row.
    pub async fn record_run(&self, run: &InsertRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scrape_runs
                (cycle_id, source, started_at, post_count, new_posts, error_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(run.cycle_id.to_string())
        .bind(&run.source)
        .bind(Utc::now().to_rfc3339())
        .bind(run.post_count)
        .bind(run.new_posts)
        .bind(run.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append one scrape_errors row. Logs a warning on failure rather than
    /// propagating — a broken audit write shouldn't take down the cycle.
    pub async fn record_error(&self, e: InsertError) {
        let result = sqlx::query(
            r#"
            INSERT INTO scrape_errors
                (timestamp, source, error_kind, message, record_kind, record_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&e.source)
        .bind(&e.error_kind)
        .bind(&e.message)
        .bind(&e.record_kind)
        .bind(&e.record_id)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(error_kind = %e.error_kind, error = %err, "Failed to record scrape error");
        }
    }

    /// Posts whose comment trees are still unfetched, newest first.
    pub async fn posts_needing_comments(&self, limit: i64) -> Result<Vec<PendingComments>> {
        let rows = sqlx::query_as::<_, PendingComments>(
            r#"
            SELECT id AS post_id, permalink,
                   crosspost_parent IS NOT NULL AS is_crosspost
            FROM posts
            WHERE comments_fetched = 0 AND permalink != ''
            ORDER BY created_utc DESC, id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Posts enriched against a lexicon older than `current_version`.
    /// Cross-posts are excluded; their parent carries the analysis.
    pub async fn stale_posts(&self, current_version: i64, limit: i64) -> Result<Vec<StalePost>> {
        let rows = sqlx::query_as::<_, StalePost>(
            r#"
            SELECT id, title, body FROM posts
            WHERE lexicon_version < ?1 AND crosspost_parent IS NULL
            ORDER BY created_utc DESC, id ASC
            LIMIT ?2
            "#,
        )
        .bind(current_version)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Comments enriched against a lexicon older than `current_version`,
    /// excluding those under cross-posts.
    pub async fn stale_comments(
        &self,
        current_version: i64,
        limit: i64,
    ) -> Result<Vec<StaleComment>> {
        let rows = sqlx::query_as::<_, StaleComment>(
            r#"
            SELECT c.id, c.post_id, c.body
            FROM comments c JOIN posts p ON p.id = c.post_id
            WHERE c.lexicon_version < ?1 AND p.crosspost_parent IS NULL
            ORDER BY c.created_utc DESC, c.id ASC
            LIMIT ?2
            "#,
        )
        .bind(current_version)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Write back a re-enriched post's sentiment and stamp its version.
    pub async fn update_post_enrichment(
        &self,
        post_id: &str,
        sentiment: Option<f64>,
        lexicon_version: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE posts SET sentiment = ?1, lexicon_version = ?2 WHERE id = ?3")
            .bind(sentiment)
            .bind(lexicon_version)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Write back a re-enriched comment's sentiment and stamp its version.
    pub async fn update_comment_enrichment(
        &self,
        comment_id: &str,
        sentiment: Option<f64>,
        lexicon_version: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE comments SET sentiment = ?1, lexicon_version = ?2 WHERE id = ?3")
            .bind(sentiment)
            .bind(lexicon_version)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
