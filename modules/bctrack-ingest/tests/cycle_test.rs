use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use bctrack_common::{Config, SortOrder};
use bctrack_ingest::backfill;
use bctrack_ingest::pipeline::Tracker;
use bctrack_ingest::testing::{comment_node, raw_post, MockSource};
use bctrack_store::{InsertPost, QueryFilter, Store};

async fn memory_store() -> Arc<Store> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    let store = Store::new(pool);
    store.migrate().await.unwrap();
    Arc::new(store)
}

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        web_host: "127.0.0.1".to_string(),
        web_port: 0,
        user_agent: "bctrack-test".to_string(),
        fetch_timeout_secs: 5,
        fetch_retries: 0,
        comment_fetch_cap: 50,
    }
}

#[tokio::test]
async fn end_to_end_enrichment_of_a_single_post() {
    let store = memory_store().await;
    let mut post = raw_post(
        "abc1",
        "birthcontrol",
        "Switched to Mirena",
        "Switched to Mirena, mood swings were awful",
    );
    post.score = 40;
    post.num_comments = 12;
    let source = MockSource::new().with_listing("birthcontrol", SortOrder::New, vec![post]);

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.new_posts, 1);

    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].method, "Mirena");

    let effects = store.side_effects_for_post("abc1").await.unwrap();
    assert_eq!(effects, vec!["Mood swings"]);

    let posts = store
        .top_posts("Mirena", 10, &QueryFilter::default())
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    let stored = &posts[0];
    assert!(stored.sentiment.unwrap() < 0.0);
    assert!((stored.engagement - 10.70).abs() < 0.01);
}

#[tokio::test]
async fn reingesting_the_same_listing_is_idempotent() {
    let store = memory_store().await;
    let source = MockSource::new().with_listing(
        "birthcontrol",
        SortOrder::New,
        vec![raw_post("p1", "birthcontrol", "Mirena question", "thinking about mirena")],
    );
    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());

    let first = tracker.run_cycle().await.unwrap();
    let second = tracker.run_cycle().await.unwrap();
    assert_eq!(first.new_posts, 1);
    assert_eq!(second.new_posts, 0);
    assert_eq!(second.mentions_found, 0);

    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    assert_eq!(counts[0].count, 1);
    assert_eq!(store.stats().await.unwrap().total_posts, 1);
}

#[tokio::test]
async fn crossposts_are_stored_but_not_enriched() {
    let store = memory_store().await;
    let mut xpost = raw_post(
        "x1",
        "prochoice",
        "Mirena was awful",
        "crossposting this mirena story",
    );
    xpost.crosspost_parent = Some("orig1".to_string());
    let source = MockSource::new().with_listing("prochoice", SortOrder::New, vec![xpost]);

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.crossposts, 1);

    // Row exists with engagement, but carries no mentions, effects, or sentiment.
    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    assert!(counts.is_empty());
    assert!(store.side_effects_for_post("x1").await.unwrap().is_empty());

    let (sentiment, engagement): (Option<f64>, f64) =
        sqlx::query_as("SELECT sentiment, engagement FROM posts WHERE id = 'x1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert!(sentiment.is_none());
    assert!(engagement > 0.0);
}

#[tokio::test]
async fn one_malformed_record_does_not_sink_the_batch() {
    let store = memory_store().await;
    let source = MockSource::new().with_listing(
        "birthcontrol",
        SortOrder::New,
        vec![
            raw_post("good1", "birthcontrol", "Yaz", "started yaz"),
            raw_post("", "birthcontrol", "broken", "no id"),
            raw_post("good2", "birthcontrol", "Slynd", "switched to slynd"),
        ],
    );

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.new_posts, 2);
    assert_eq!(stats.errors, 1);

    let errors = store.recent_errors(10).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind, "malformed_record");
    assert_eq!(store.stats().await.unwrap().total_posts, 2);
}

#[tokio::test]
async fn one_failing_source_does_not_block_the_others() {
    let store = memory_store().await;
    let source = MockSource::new()
        .with_failing_source("birthcontrol")
        .with_listing(
            "AskDocs",
            SortOrder::New,
            vec![raw_post("d1", "AskDocs", "Nexplanon", "nexplanon question")],
        );

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.new_posts, 1);
    assert!(stats.errors >= 1);

    let errors = store.recent_errors(10).await.unwrap();
    assert!(errors
        .iter()
        .any(|e| e.source.as_deref() == Some("birthcontrol") && e.error_kind == "transient_fetch"));
    assert_eq!(store.stats().await.unwrap().total_posts, 1);
}

#[tokio::test]
async fn hot_listing_failure_keeps_new_listing_posts() {
    let store = memory_store().await;
    let source = MockSource::new()
        .with_listing(
            "birthcontrol",
            SortOrder::New,
            vec![raw_post("p1", "birthcontrol", "Mirena story", "got a mirena last month")],
        )
        .with_failing_listing("birthcontrol", SortOrder::Hot);

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.new_posts, 1);
    assert!(stats.errors >= 1);

    // The 'new' context's posts survive the 'hot' failure.
    assert_eq!(store.stats().await.unwrap().total_posts, 1);
    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    assert_eq!(counts[0].method, "Mirena");

    // The run row is still written and the failed context is audited.
    let runs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM scrape_runs WHERE source = 'birthcontrol'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(runs, 1);
    let errors = store.recent_errors(10).await.unwrap();
    assert!(errors
        .iter()
        .any(|e| e.record_kind.as_deref() == Some("listing") && e.error_kind == "transient_fetch"));
}

#[tokio::test]
async fn comment_pass_attaches_mentions_to_post_and_effects_to_comment() {
    let store = memory_store().await;
    let source = MockSource::new()
        .with_listing(
            "birthcontrol",
            SortOrder::New,
            vec![raw_post("p1", "birthcontrol", "IUD decision", "deciding on an iud")],
        )
        .with_tree(
            "p1",
            vec![comment_node(
                "c1",
                "Paragard gave me terrible acne, would not recommend",
            )],
        );

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert_eq!(stats.new_comments, 1);
    assert_eq!(stats.posts_with_comments, 1);

    // The comment's method mention counts toward the parent post.
    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    let methods: Vec<&str> = counts.iter().map(|c| c.method.as_str()).collect();
    assert!(methods.contains(&"Paragard"));

    // The side effect attaches to the comment record.
    let matrix = store.effect_matrix(&QueryFilter::default()).await.unwrap();
    assert!(matrix
        .iter()
        .any(|cell| cell.method == "Paragard" && cell.effect == "Acne"));

    let comments = store.comments_for_post("p1").await.unwrap();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].sentiment.unwrap() < 0.0);
}

#[tokio::test]
async fn empty_comment_trees_still_mark_the_post_fetched() {
    let store = memory_store().await;
    let source = MockSource::new().with_listing(
        "birthcontrol",
        SortOrder::New,
        vec![raw_post("p1", "birthcontrol", "quiet post", "no comments yet")],
    );
    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    tracker.run_cycle().await.unwrap();

    assert!(store.posts_needing_comments(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_tree_fetch_leaves_the_post_for_next_cycle() {
    let store = memory_store().await;
    let source = MockSource::new()
        .with_listing(
            "birthcontrol",
            SortOrder::New,
            vec![raw_post("p1", "birthcontrol", "flaky", "comment fetch will fail")],
        )
        .with_failing_tree("p1");
    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    let stats = tracker.run_cycle().await.unwrap();
    assert!(stats.errors >= 1);

    let pending = store.posts_needing_comments(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].post_id, "p1");
}

#[tokio::test]
async fn hot_listing_upgrades_sort_tag() {
    let store = memory_store().await;
    let mut hot = raw_post("p1", "birthcontrol", "trending", "mirena post");
    hot.sort_order = SortOrder::Hot;
    let source = MockSource::new()
        .with_listing(
            "birthcontrol",
            SortOrder::New,
            vec![raw_post("p1", "birthcontrol", "trending", "mirena post")],
        )
        .with_listing("birthcontrol", SortOrder::Hot, vec![hot]);

    let tracker = Tracker::new(store.clone(), Arc::new(source), test_config());
    tracker.run_cycle().await.unwrap();

    let sort: String = sqlx::query_scalar("SELECT sort_order FROM posts WHERE id = 'p1'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(sort, "hot");
}

#[tokio::test]
async fn backfill_enriches_stale_rows_without_refetch() {
    let store = memory_store().await;
    // A row written before the current lexicon, sentiment never computed.
    store
        .upsert_post(&InsertPost {
            id: "old1".to_string(),
            source: "birthcontrol".to_string(),
            title: "Kyleena review".to_string(),
            body: "the kyleena cramps were awful".to_string(),
            created_utc: 1_600_000_000,
            score: 5,
            num_comments: 0,
            permalink: "/r/birthcontrol/old1".to_string(),
            sort_order: SortOrder::New,
            crosspost_parent: None,
            sentiment: None,
            engagement: 2.0,
            lexicon_version: 0,
        })
        .await
        .unwrap();

    let stats = backfill::run(&store).await.unwrap();
    assert_eq!(stats.posts_updated, 1);
    assert!(stats.mentions_added >= 1);
    assert!(stats.effects_added >= 1);

    let counts = store.mention_counts(&QueryFilter::default()).await.unwrap();
    assert_eq!(counts[0].method, "Kyleena");
    let (sentiment,): (Option<f64>,) =
        sqlx::query_as("SELECT sentiment FROM posts WHERE id = 'old1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert!(sentiment.unwrap() < 0.0);

    // A second pass finds nothing stale.
    let again = backfill::run(&store).await.unwrap();
    assert_eq!(again.posts_updated, 0);
    assert_eq!(again.mentions_added, 0);

    // Check effects landed on the post record.
    let effects = store.side_effects_for_post("old1").await.unwrap();
    assert_eq!(effects, vec!["Cramping"]);
}
