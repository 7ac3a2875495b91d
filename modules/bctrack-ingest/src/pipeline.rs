use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use bctrack_common::{
    engagement_score, flatten_comment_tree, sentiment, sources, Config, Lexicon, RawComment,
    RawPost, Result, SortOrder, SourceConfig, SourceKind, TrackerError,
};
use bctrack_store::{InsertComment, InsertError, InsertPost, InsertRun, PendingComments, Store};

use crate::retry::with_retry;
use crate::source::SourceClient;

/// Comment trees fetched concurrently during the comment pass. Writes stay
/// sequential regardless.
const COMMENT_FETCH_CONCURRENCY: usize = 4;

/// Stats from one ingestion cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub sources_scanned: u32,
    pub posts_fetched: u32,
    pub new_posts: u32,
    pub crossposts: u32,
    pub mentions_found: u64,
    pub effects_found: u64,
    pub posts_with_comments: u32,
    pub new_comments: u64,
    pub errors: u32,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Ingestion Cycle Complete ===")?;
        writeln!(f, "Sources scanned:  {}", self.sources_scanned)?;
        writeln!(f, "Posts fetched:    {}", self.posts_fetched)?;
        writeln!(f, "New posts:        {}", self.new_posts)?;
        writeln!(f, "Cross-posts:      {}", self.crossposts)?;
        writeln!(f, "New mentions:     {}", self.mentions_found)?;
        writeln!(f, "New side effects: {}", self.effects_found)?;
        writeln!(f, "Comment trees:    {}", self.posts_with_comments)?;
        writeln!(f, "New comments:     {}", self.new_comments)?;
        writeln!(f, "Errors:           {}", self.errors)?;
        Ok(())
    }
}

pub struct Tracker {
    store: Arc<Store>,
    source: Arc<dyn SourceClient>,
    config: Config,
    contraceptives: Lexicon,
    side_effects: Lexicon,
    running: AtomicBool,
}

impl Tracker {
    pub fn new(store: Arc<Store>, source: Arc<dyn SourceClient>, config: Config) -> Self {
        Self {
            store,
            source,
            config,
            contraceptives: Lexicon::contraceptives(),
            side_effects: Lexicon::side_effects(),
            running: AtomicBool::new(false),
        }
    }

    /// Whether a cycle is currently executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The method taxonomy the pipeline enriches with.
    pub fn contraceptives(&self) -> &Lexicon {
        &self.contraceptives
    }

    /// The side-effect taxonomy.
    pub fn side_effects(&self) -> &Lexicon {
        &self.side_effects
    }

    /// Atomically claim the cycle lock without starting work. Callers that
    /// spawn the cycle on another task claim first, so two simultaneous
    /// triggers can never both report success. Pair with
    /// `run_claimed_cycle`.
    pub fn claim_cycle(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TrackerError::CycleInProgress);
        }
        Ok(())
    }

    /// Run a cycle whose lock was claimed with `claim_cycle`. The lock is
    /// released when the cycle finishes, success or failure.
    pub async fn run_claimed_cycle(&self) -> Result<CycleStats> {
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Run one full ingestion cycle. Rejects overlap: a second caller gets
    /// `CycleInProgress` instead of queueing behind the first.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        self.claim_cycle()?;
        self.run_claimed_cycle().await
    }

    async fn run_inner(&self) -> Result<CycleStats> {
        let cycle_id = Uuid::new_v4();
        let mut stats = CycleStats::default();
        info!(%cycle_id, "Starting ingestion cycle");

        for src in sources() {
            match self.ingest_source(cycle_id, &src, &mut stats).await {
                Ok(()) => stats.sources_scanned += 1,
                Err(e) if e.is_cycle_fatal() => {
                    error!(source = src.name, error = %e, "Storage failure, aborting cycle");
                    return Err(e);
                }
                Err(e) => {
                    warn!(source = src.name, error = %e, "Source failed, continuing with the rest");
                    self.store
                        .record_error(InsertError {
                            source: Some(src.name.to_string()),
                            error_kind: e.error_kind().to_string(),
                            message: e.to_string(),
                            record_kind: None,
                            record_id: None,
                        })
                        .await;
                    stats.errors += 1;
                }
            }
        }

        self.comment_pass(&mut stats).await?;

        info!("{stats}");
        Ok(stats)
    }

    /// Ingest one forum: its 'new' listing at the configured depth, plus a
    /// shallow 'hot' listing for the visibility signal. Each sort context is
    /// fetched and ingested on its own, so a failed 'hot' fetch never throws
    /// away posts the 'new' fetch already delivered, and the run row is
    /// written either way.
    async fn ingest_source(
        &self,
        cycle_id: Uuid,
        src: &SourceConfig,
        stats: &mut CycleStats,
    ) -> Result<()> {
        let retries = self.config.fetch_retries;
        info!(source = src.name, limit = src.page_limit, "Scanning source");

        let mut post_count = 0i64;
        let mut new_posts = 0i64;
        let mut errors = 0i64;

        let contexts = [
            (SortOrder::New, src.page_limit),
            (SortOrder::Hot, src.page_limit.min(50)),
        ];
        for (sort, limit) in contexts {
            let posts = match with_retry(retries, || {
                self.source.fetch_listing(src.name, sort, limit)
            })
            .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(source = src.name, sort = %sort, error = %e, "Listing fetch failed, keeping the other context");
                    self.store
                        .record_error(InsertError {
                            source: Some(src.name.to_string()),
                            error_kind: e.error_kind().to_string(),
                            message: e.to_string(),
                            record_kind: Some("listing".to_string()),
                            record_id: None,
                        })
                        .await;
                    errors += 1;
                    stats.errors += 1;
                    continue;
                }
            };

            for post in &posts {
                match self.ingest_post(post, stats).await {
                    Ok(is_new) => {
                        post_count += 1;
                        if is_new {
                            new_posts += 1;
                        }
                    }
                    Err(e) if e.is_cycle_fatal() => return Err(e),
                    Err(e) => {
                        warn!(source = src.name, post_id = post.id, error = %e, "Record failed, skipping");
                        self.store
                            .record_error(InsertError {
                                source: Some(src.name.to_string()),
                                error_kind: e.error_kind().to_string(),
                                message: e.to_string(),
                                record_kind: Some("post".to_string()),
                                record_id: Some(post.id.clone()),
                            })
                            .await;
                        errors += 1;
                        stats.errors += 1;
                    }
                }
            }
        }

        self.store
            .record_run(&InsertRun {
                cycle_id,
                source: src.name.to_string(),
                post_count,
                new_posts,
                error_count: errors,
            })
            .await?;

        info!(
            source = src.name,
            fetched = post_count,
            new = new_posts,
            errors,
            "Source scan complete"
        );
        Ok(())
    }

    /// Enrich and upsert one post. Cross-posts keep their row and engagement
    /// but skip lexicon and sentiment analysis: the parent post carries the
    /// mention, and double-counting would skew every aggregate.
    async fn ingest_post(&self, post: &RawPost, stats: &mut CycleStats) -> Result<bool> {
        if post.id.is_empty() {
            return Err(TrackerError::MalformedRecord(
                "post with an empty id".into(),
            ));
        }

        stats.posts_fetched += 1;
        let engagement = engagement_score(post.score, post.num_comments);

        if post.crosspost_parent.is_some() {
            stats.crossposts += 1;
            let is_new = self
                .store
                .upsert_post(&InsertPost {
                    id: post.id.clone(),
                    source: post.source.clone(),
                    title: post.title.clone(),
                    body: post.body.clone(),
                    created_utc: post.created_utc,
                    score: post.score,
                    num_comments: post.num_comments,
                    permalink: post.permalink.clone(),
                    sort_order: post.sort_order,
                    crosspost_parent: post.crosspost_parent.clone(),
                    sentiment: None,
                    engagement,
                    lexicon_version: self.contraceptives.version(),
                })
                .await?;
            if is_new {
                stats.new_posts += 1;
            }
            return Ok(is_new);
        }

        let text = format!("{} {}", post.title, post.body);
        let sentiment = sentiment::score(&text);
        let methods = self.contraceptives.matches(&text);
        let effects = self.side_effects.matches(&text);

        let is_new = self
            .store
            .upsert_post(&InsertPost {
                id: post.id.clone(),
                source: post.source.clone(),
                title: post.title.clone(),
                body: post.body.clone(),
                created_utc: post.created_utc,
                score: post.score,
                num_comments: post.num_comments,
                permalink: post.permalink.clone(),
                sort_order: post.sort_order,
                crosspost_parent: None,
                sentiment,
                engagement,
                lexicon_version: self.contraceptives.version(),
            })
            .await?;
        if is_new {
            stats.new_posts += 1;
        }

        stats.mentions_found += self.store.insert_mentions(&post.id, &methods).await?;
        stats.effects_found += self
            .store
            .insert_side_effects(SourceKind::Post, &post.id, &effects)
            .await?;
        Ok(is_new)
    }

    /// Walk comment trees for posts that haven't had theirs fetched. Trees
    /// are fetched concurrently, writes happen one record at a time. The
    /// fetched flag is set even for empty threads; a fetch failure leaves it
    /// unset so the post is retried next cycle.
    async fn comment_pass(&self, stats: &mut CycleStats) -> Result<()> {
        let pending = self
            .store
            .posts_needing_comments(self.config.comment_fetch_cap)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }
        info!(posts = pending.len(), "Fetching comment trees");

        let retries = self.config.fetch_retries;
        let fetched: Vec<_> = stream::iter(pending.into_iter().map(|post| {
            let client = self.source.clone();
            async move {
                let tree = with_retry(retries, || {
                    client.fetch_comment_tree(&post.post_id, &post.permalink)
                })
                .await;
                (post, tree)
            }
        }))
        .buffer_unordered(COMMENT_FETCH_CONCURRENCY)
        .collect()
        .await;

        for (post, tree) in fetched {
            match tree {
                Ok(tree) => {
                    let comments = flatten_comment_tree(tree);
                    for comment in comments {
                        match self.ingest_comment(&post, comment, stats).await {
                            Ok(()) => {}
                            Err(e) if e.is_cycle_fatal() => return Err(e),
                            Err(e) => {
                                warn!(post_id = post.post_id, error = %e, "Comment failed, skipping");
                                self.store
                                    .record_error(InsertError {
                                        source: None,
                                        error_kind: e.error_kind().to_string(),
                                        message: e.to_string(),
                                        record_kind: Some("comment".to_string()),
                                        record_id: Some(post.post_id.clone()),
                                    })
                                    .await;
                                stats.errors += 1;
                            }
                        }
                    }
                    self.store.mark_comments_fetched(&post.post_id).await?;
                    stats.posts_with_comments += 1;
                }
                Err(e) => {
                    warn!(post_id = post.post_id, error = %e, "Comment tree fetch failed");
                    self.store
                        .record_error(InsertError {
                            source: None,
                            error_kind: e.error_kind().to_string(),
                            message: e.to_string(),
                            record_kind: Some("post".to_string()),
                            record_id: Some(post.post_id.clone()),
                        })
                        .await;
                    stats.errors += 1;
                }
            }
        }
        Ok(())
    }

    /// Enrich and upsert one comment. Mentions found in a comment attach to
    /// the parent post; side effects attach to the comment itself. Comments
    /// under a cross-post are stored but never enriched.
    async fn ingest_comment(
        &self,
        post: &PendingComments,
        comment: RawComment,
        stats: &mut CycleStats,
    ) -> Result<()> {
        if comment.id.is_empty() {
            return Err(TrackerError::MalformedRecord(
                "comment with an empty id".into(),
            ));
        }

        let sentiment = if post.is_crosspost {
            None
        } else {
            sentiment::score(&comment.body)
        };

        let is_new = self
            .store
            .upsert_comment(&InsertComment {
                id: comment.id.clone(),
                post_id: post.post_id.clone(),
                body: comment.body.clone(),
                author: comment.author,
                score: comment.score,
                created_utc: comment.created_utc,
                sentiment,
                lexicon_version: self.contraceptives.version(),
            })
            .await?;
        if is_new {
            stats.new_comments += 1;
        }

        if post.is_crosspost {
            return Ok(());
        }

        let methods = self.contraceptives.matches(&comment.body);
        let effects = self.side_effects.matches(&comment.body);
        stats.mentions_found += self.store.insert_mentions(&post.post_id, &methods).await?;
        stats.effects_found += self
            .store
            .insert_side_effects(SourceKind::Comment, &comment.id, &effects)
            .await?;
        Ok(())
    }
}
