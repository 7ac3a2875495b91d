use serde::{Deserialize, Serialize};

/// Listing sort context a post was discovered under.
///
/// A post seen under both contexts in one cycle keeps the `Hot` tag — being
/// on the front page is the stronger visibility signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    New,
    Hot,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::New => "new",
            SortOrder::Hot => "hot",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which table a side-effect row points back at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Post,
    Comment,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Post => "post",
            SourceKind::Comment => "comment",
        }
    }
}

/// A raw post as returned by a source client, before enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    /// Source-assigned identifier, globally unique. The natural key.
    pub id: String,
    pub title: String,
    pub body: String,
    /// Creation time, epoch seconds.
    pub created_utc: i64,
    pub score: i64,
    pub num_comments: i64,
    pub permalink: String,
    /// Forum the post was fetched from.
    pub source: String,
    pub sort_order: SortOrder,
    /// Identifier of the parent record when this is a cross-post.
    pub crosspost_parent: Option<String>,
}

/// A flattened comment ready for enrichment and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawComment {
    pub id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: i64,
}

/// One node of a source comment tree. Replies nest to arbitrary depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: i64,
    #[serde(default)]
    pub replies: Vec<CommentNode>,
}

/// Flatten a comment tree with an explicit work stack. Deep threads must not
/// recurse on the call stack.
pub fn flatten_comment_tree(roots: Vec<CommentNode>) -> Vec<RawComment> {
    let mut out = Vec::new();
    let mut stack = roots;
    while let Some(node) = stack.pop() {
        out.push(RawComment {
            id: node.id,
            body: node.body,
            author: node.author,
            score: node.score,
            created_utc: node.created_utc,
        });
        stack.extend(node.replies);
    }
    out
}
