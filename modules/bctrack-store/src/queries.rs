// Read-side aggregations. Every multi-row query carries a stable order so
// API responses don't shuffle between identical requests.

use bctrack_common::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::store::Store;

/// Optional filters shared by the aggregation queries. Epoch-second bounds
/// are inclusive on both ends.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MentionCount {
    pub method: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: String,
    pub method: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MethodSentiment {
    pub method: String,
    pub avg_sentiment: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EffectCount {
    pub effect: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MatrixCell {
    pub method: String,
    pub effect: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PostRow {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub created_utc: i64,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
    pub sentiment: Option<f64>,
    pub engagement: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: i64,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ErrorRow {
    pub id: i64,
    pub timestamp: String,
    pub source: Option<String>,
    pub error_kind: String,
    pub message: String,
    pub record_kind: Option<String>,
    pub record_id: Option<String>,
}

/// A stored post with enough text to annotate for the validation endpoint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ValidationPost {
    pub id: String,
    pub title: String,
    pub body: String,
    pub sentiment: Option<f64>,
}

/// Whole-database summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_posts: i64,
    pub total_comments: i64,
    pub total_mentions: i64,
    pub total_cycles: i64,
    pub last_cycle_at: Option<String>,
    pub avg_sentiment: Option<f64>,
    pub source_count: i64,
    pub errors_24h: i64,
}

/// Append the shared date/source predicates against post columns.
fn push_post_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &QueryFilter) {
    if let Some(from) = filter.from {
        qb.push(" AND p.created_utc >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND p.created_utc <= ").push_bind(to);
    }
    if let Some(source) = &filter.source {
        qb.push(" AND p.source = ").push_bind(source.clone());
    }
}

impl Store {
    /// Mention counts per method, most-mentioned first.
    pub async fn mention_counts(&self, filter: &QueryFilter) -> Result<Vec<MentionCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT m.method, COUNT(*) AS count \
             FROM mentions m JOIN posts p ON p.id = m.post_id WHERE 1 = 1",
        );
        push_post_filters(&mut qb, filter);
        qb.push(" GROUP BY m.method ORDER BY count DESC, m.method ASC");
        let rows = qb
            .build_query_as::<MentionCount>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Mention counts per (day, method), restricted to the `top_n` methods
    /// by overall count within the same filter window. Rows with no usable
    /// creation time are excluded rather than piled onto 1970-01-01.
    pub async fn daily_counts(
        &self,
        filter: &QueryFilter,
        top_n: i64,
    ) -> Result<Vec<DailyCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT date(p.created_utc, 'unixepoch') AS day, m.method, COUNT(*) AS count \
             FROM mentions m JOIN posts p ON p.id = m.post_id \
             WHERE p.created_utc > 0",
        );
        push_post_filters(&mut qb, filter);
        qb.push(
            " AND m.method IN ( \
             SELECT m2.method FROM mentions m2 JOIN posts p2 ON p2.id = m2.post_id \
             WHERE 1 = 1",
        );
        if let Some(from) = filter.from {
            qb.push(" AND p2.created_utc >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND p2.created_utc <= ").push_bind(to);
        }
        if let Some(source) = &filter.source {
            qb.push(" AND p2.source = ").push_bind(source.clone());
        }
        qb.push(" GROUP BY m2.method ORDER BY COUNT(*) DESC, m2.method ASC LIMIT ")
            .push_bind(top_n);
        qb.push(")");
        qb.push(" GROUP BY day, m.method ORDER BY day ASC, count DESC, m.method ASC");
        let rows = qb
            .build_query_as::<DailyCount>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Average sentiment per method over posts that carried a signal.
    /// Methods whose every post scored NULL don't appear at all.
    pub async fn sentiment_by_method(&self, filter: &QueryFilter) -> Result<Vec<MethodSentiment>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT m.method, AVG(p.sentiment) AS avg_sentiment, COUNT(*) AS count \
             FROM mentions m JOIN posts p ON p.id = m.post_id \
             WHERE p.sentiment IS NOT NULL",
        );
        push_post_filters(&mut qb, filter);
        qb.push(" GROUP BY m.method ORDER BY avg_sentiment DESC, m.method ASC");
        let rows = qb
            .build_query_as::<MethodSentiment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Side-effect counts across posts and comments, optionally narrowed to
    /// records whose post mentions a single method. Counts distinct source
    /// records, so one rambling post tallies each effect once.
    pub async fn side_effect_counts(
        &self,
        filter: &QueryFilter,
        method: Option<&str>,
    ) -> Result<Vec<EffectCount>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT se.effect, COUNT(DISTINCT se.source_id) AS count \
             FROM side_effects se \
             LEFT JOIN posts p ON se.source_kind = 'post' AND se.source_id = p.id \
             LEFT JOIN comments c ON se.source_kind = 'comment' AND se.source_id = c.id",
        );
        if method.is_some() {
            qb.push(" JOIN mentions m ON m.post_id = COALESCE(p.id, c.post_id)");
        }
        qb.push(" WHERE 1 = 1");
        if let Some(from) = filter.from {
            qb.push(" AND COALESCE(p.created_utc, c.created_utc) >= ")
                .push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND COALESCE(p.created_utc, c.created_utc) <= ")
                .push_bind(to);
        }
        if let Some(source) = &filter.source {
            qb.push(
                " AND COALESCE(p.source, \
                 (SELECT p2.source FROM posts p2 WHERE p2.id = c.post_id)) = ",
            )
            .push_bind(source.clone());
        }
        if let Some(method) = method {
            qb.push(" AND m.method = ").push_bind(method.to_string());
        }
        qb.push(" GROUP BY se.effect ORDER BY count DESC, se.effect ASC");
        let rows = qb
            .build_query_as::<EffectCount>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// The method × effect co-occurrence matrix. Post-sourced and
    /// comment-sourced effects are tallied separately then summed; comment
    /// effects attribute to the methods mentioned on the parent post.
    pub async fn effect_matrix(&self, filter: &QueryFilter) -> Result<Vec<MatrixCell>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT method, effect, SUM(count) AS count FROM ( \
             SELECT m.method AS method, se.effect AS effect, \
                    COUNT(DISTINCT se.source_id) AS count \
             FROM side_effects se \
             JOIN posts p ON se.source_kind = 'post' AND se.source_id = p.id \
             JOIN mentions m ON m.post_id = p.id \
             WHERE 1 = 1",
        );
        push_post_filters(&mut qb, filter);
        qb.push(
            " GROUP BY m.method, se.effect \
             UNION ALL \
             SELECT m.method AS method, se.effect AS effect, \
                    COUNT(DISTINCT se.source_id) AS count \
             FROM side_effects se \
             JOIN comments c ON se.source_kind = 'comment' AND se.source_id = c.id \
             JOIN posts p ON p.id = c.post_id \
             JOIN mentions m ON m.post_id = c.post_id \
             WHERE 1 = 1",
        );
        if let Some(from) = filter.from {
            qb.push(" AND c.created_utc >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND c.created_utc <= ").push_bind(to);
        }
        if let Some(source) = &filter.source {
            qb.push(" AND p.source = ").push_bind(source.clone());
        }
        qb.push(
            " GROUP BY m.method, se.effect \
             ) GROUP BY method, effect ORDER BY method ASC, effect ASC",
        );
        let rows = qb
            .build_query_as::<MatrixCell>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Posts mentioning `method`, ranked by engagement.
    pub async fn top_posts(
        &self,
        method: &str,
        limit: i64,
        filter: &QueryFilter,
    ) -> Result<Vec<PostRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.id, p.source, p.title, p.body, p.created_utc, p.score, \
                    p.num_comments, p.permalink, p.sentiment, p.engagement \
             FROM posts p JOIN mentions m ON m.post_id = p.id \
             WHERE m.method = ",
        );
        qb.push_bind(method.to_string());
        push_post_filters(&mut qb, filter);
        qb.push(" ORDER BY p.engagement DESC, p.id ASC LIMIT ")
            .push_bind(limit);
        let rows = qb.build_query_as::<PostRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Comments under a post, highest-scored first.
    pub async fn comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, post_id, body, author, score, created_utc, sentiment
            FROM comments WHERE post_id = ?1
            ORDER BY score DESC, id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct side effects found on a post or anywhere in its thread.
    pub async fn side_effects_for_post(&self, post_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT effect FROM side_effects
            WHERE (source_kind = 'post' AND source_id = ?1)
               OR (source_kind = 'comment' AND source_id IN
                   (SELECT id FROM comments WHERE post_id = ?1))
            ORDER BY effect ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Strongest-signal posts for the sentiment validation examples.
    pub async fn sentiment_examples(&self, limit: i64) -> Result<Vec<ValidationPost>> {
        let rows = sqlx::query_as::<_, ValidationPost>(
            r#"
            SELECT id, title, body, sentiment FROM posts
            WHERE sentiment IS NOT NULL AND length(body) > 50
            ORDER BY ABS(sentiment) DESC, id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Posts tagged with at least two methods, highest-scored first. A post
    /// with several hits shows the matcher doing real work.
    pub async fn mention_examples(&self, limit: i64) -> Result<Vec<ValidationPost>> {
        let rows = sqlx::query_as::<_, ValidationPost>(
            r#"
            SELECT p.id, p.title, p.body, p.sentiment
            FROM posts p JOIN mentions m ON m.post_id = p.id
            WHERE length(p.body) > 30
            GROUP BY p.id HAVING COUNT(m.method) >= 2
            ORDER BY p.score DESC, p.id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Posts tagged with at least two side effects, highest-scored first.
    pub async fn effect_examples(&self, limit: i64) -> Result<Vec<ValidationPost>> {
        let rows = sqlx::query_as::<_, ValidationPost>(
            r#"
            SELECT p.id, p.title, p.body, p.sentiment
            FROM posts p
            JOIN side_effects se ON se.source_kind = 'post' AND se.source_id = p.id
            WHERE length(p.body) > 30
            GROUP BY p.id HAVING COUNT(se.effect) >= 2
            ORDER BY p.score DESC, p.id ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Most recent error rows, newest first.
    pub async fn recent_errors(&self, limit: i64) -> Result<Vec<ErrorRow>> {
        let rows = sqlx::query_as::<_, ErrorRow>(
            "SELECT * FROM scrape_errors ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whole-database counters for the status endpoint.
    pub async fn stats(&self) -> Result<Stats> {
        let total_posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        let total_comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;
        let total_mentions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mentions")
            .fetch_one(&self.pool)
            .await?;
        let total_cycles: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT cycle_id) FROM scrape_runs")
                .fetch_one(&self.pool)
                .await?;
        let last_cycle_at: Option<String> =
            sqlx::query_scalar("SELECT MAX(started_at) FROM scrape_runs")
                .fetch_one(&self.pool)
                .await?;
        let avg_sentiment: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(sentiment) FROM posts WHERE sentiment IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let source_count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        let cutoff = (Utc::now() - Duration::hours(24)).to_rfc3339();
        let errors_24h: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scrape_errors WHERE timestamp >= ?1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;

        Ok(Stats {
            total_posts,
            total_comments,
            total_mentions,
            total_cycles,
            last_cycle_at,
            avg_sentiment,
            source_count,
            errors_24h,
        })
    }
}
