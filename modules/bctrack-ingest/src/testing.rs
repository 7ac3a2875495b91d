// Deterministic SourceClient double for pipeline tests: no network, no
// timers. Listings and comment trees come from in-memory maps; named
// sources or posts can be made to fail.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use bctrack_common::{CommentNode, RawPost, Result, SortOrder, TrackerError};

use crate::source::SourceClient;

#[derive(Default)]
pub struct MockSource {
    listings: HashMap<(String, SortOrder), Vec<RawPost>>,
    trees: HashMap<String, Vec<CommentNode>>,
    failing_sources: HashSet<String>,
    failing_listings: HashSet<(String, SortOrder)>,
    failing_trees: HashSet<String>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, source: &str, sort: SortOrder, posts: Vec<RawPost>) -> Self {
        self.listings.insert((source.to_string(), sort), posts);
        self
    }

    pub fn with_tree(mut self, post_id: &str, tree: Vec<CommentNode>) -> Self {
        self.trees.insert(post_id.to_string(), tree);
        self
    }

    /// Every listing fetch for this source fails with a transient error.
    pub fn with_failing_source(mut self, source: &str) -> Self {
        self.failing_sources.insert(source.to_string());
        self
    }

    /// One (source, sort) listing fetch fails; the other sort still works.
    pub fn with_failing_listing(mut self, source: &str, sort: SortOrder) -> Self {
        self.failing_listings.insert((source.to_string(), sort));
        self
    }

    /// The comment tree fetch for this post fails with a transient error.
    pub fn with_failing_tree(mut self, post_id: &str) -> Self {
        self.failing_trees.insert(post_id.to_string());
        self
    }
}

#[async_trait]
impl SourceClient for MockSource {
    async fn fetch_listing(
        &self,
        source: &str,
        sort: SortOrder,
        limit: u32,
    ) -> Result<Vec<RawPost>> {
        if self.failing_sources.contains(source)
            || self.failing_listings.contains(&(source.to_string(), sort))
        {
            return Err(TrackerError::Fetch(format!("mock failure for {source}")));
        }
        let mut posts = self
            .listings
            .get(&(source.to_string(), sort))
            .cloned()
            .unwrap_or_default();
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn fetch_comment_tree(
        &self,
        post_id: &str,
        _permalink: &str,
    ) -> Result<Vec<CommentNode>> {
        if self.failing_trees.contains(post_id) {
            return Err(TrackerError::Fetch(format!("mock failure for {post_id}")));
        }
        Ok(self.trees.get(post_id).cloned().unwrap_or_default())
    }
}

/// A listing post with sensible defaults for tests.
pub fn raw_post(id: &str, source: &str, title: &str, body: &str) -> RawPost {
    RawPost {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        created_utc: 1_700_000_000,
        score: 10,
        num_comments: 2,
        permalink: format!("/r/{source}/{id}"),
        source: source.to_string(),
        sort_order: SortOrder::New,
        crosspost_parent: None,
    }
}

/// A leaf comment node for tests.
pub fn comment_node(id: &str, body: &str) -> CommentNode {
    CommentNode {
        id: id.to_string(),
        body: body.to_string(),
        author: "tester".to_string(),
        score: 1,
        created_utc: 1_700_000_100,
        replies: Vec::new(),
    }
}
