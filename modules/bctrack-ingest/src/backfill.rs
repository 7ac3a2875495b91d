//! Re-enrich stored records after a lexicon change, without refetching.
//!
//! Rows stamped with an older `lexicon_version` get their sentiment
//! recomputed and any newly-matching mentions and side effects added.
//! Everything is an idempotent UPDATE or INSERT OR IGNORE, so the pass is
//! safe to run while a live cycle writes.

use tracing::info;

use bctrack_common::{sentiment, Lexicon, Result, SourceKind};
use bctrack_store::Store;

const BATCH_SIZE: i64 = 500;

#[derive(Debug, Default)]
pub struct BackfillStats {
    pub posts_updated: u64,
    pub comments_updated: u64,
    pub mentions_added: u64,
    pub effects_added: u64,
}

impl std::fmt::Display for BackfillStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "backfill: {} posts, {} comments re-enriched ({} new mentions, {} new effects)",
            self.posts_updated, self.comments_updated, self.mentions_added, self.effects_added
        )
    }
}

/// Bring every stale post and comment up to the current lexicon version.
pub async fn run(store: &Store) -> Result<BackfillStats> {
    let contraceptives = Lexicon::contraceptives();
    let side_effects = Lexicon::side_effects();
    let version = contraceptives.version();
    let mut stats = BackfillStats::default();

    loop {
        let batch = store.stale_posts(version, BATCH_SIZE).await?;
        let done = (batch.len() as i64) < BATCH_SIZE;
        for post in batch {
            let text = format!("{} {}", post.title, post.body);
            let sentiment = sentiment::score(&text);
            let methods = contraceptives.matches(&text);
            let effects = side_effects.matches(&text);

            stats.mentions_added += store.insert_mentions(&post.id, &methods).await?;
            stats.effects_added += store
                .insert_side_effects(SourceKind::Post, &post.id, &effects)
                .await?;
            // Stamping the version guarantees forward progress across batches.
            store
                .update_post_enrichment(&post.id, sentiment, version)
                .await?;
            stats.posts_updated += 1;
        }
        if done {
            break;
        }
    }

    loop {
        let batch = store.stale_comments(version, BATCH_SIZE).await?;
        let done = (batch.len() as i64) < BATCH_SIZE;
        for comment in batch {
            let sentiment = sentiment::score(&comment.body);
            let methods = contraceptives.matches(&comment.body);
            let effects = side_effects.matches(&comment.body);

            stats.mentions_added += store.insert_mentions(&comment.post_id, &methods).await?;
            stats.effects_added += store
                .insert_side_effects(SourceKind::Comment, &comment.id, &effects)
                .await?;
            store
                .update_comment_enrichment(&comment.id, sentiment, version)
                .await?;
            stats.comments_updated += 1;
        }
        if done {
            break;
        }
    }

    info!("{stats}");
    Ok(stats)
}
