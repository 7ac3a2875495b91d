// The fetch boundary. Everything the pipeline knows about the outside world
// comes through SourceClient, which keeps the cycle testable with MockSource.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use bctrack_common::{CommentNode, Config, RawPost, Result, SortOrder, TrackerError};

/// Delay between paginated listing requests. The public JSON endpoints
/// throttle aggressively without it.
const PAGE_DELAY: Duration = Duration::from_millis(1500);

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch up to `limit` posts from a forum listing under the given sort.
    async fn fetch_listing(
        &self,
        source: &str,
        sort: SortOrder,
        limit: u32,
    ) -> Result<Vec<RawPost>>;

    /// Fetch the full comment tree for a post.
    async fn fetch_comment_tree(
        &self,
        post_id: &str,
        permalink: &str,
    ) -> Result<Vec<CommentNode>>;
}

/// Reddit's public JSON endpoints. No OAuth; a descriptive User-Agent and a
/// polite page delay are the whole contract.
pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| TrackerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: "https://www.reddit.com".to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Fetch(format!("timeout fetching {url}"))
            } else {
                TrackerError::Fetch(format!("request to {url} failed: {e}"))
            }
        })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                Err(TrackerError::RateLimited(format!("429 from {url}")))
            }
            status if status.is_server_error() => {
                Err(TrackerError::Fetch(format!("HTTP {status} from {url}")))
            }
            status if !status.is_success() => {
                Err(TrackerError::Fetch(format!("HTTP {status} from {url}")))
            }
            _ => response
                .json::<Value>()
                .await
                .map_err(|e| TrackerError::MalformedRecord(format!("bad JSON from {url}: {e}"))),
        }
    }
}

#[async_trait]
impl SourceClient for RedditClient {
    async fn fetch_listing(
        &self,
        source: &str,
        sort: SortOrder,
        limit: u32,
    ) -> Result<Vec<RawPost>> {
        let base = format!("{}/r/{}/{}.json", self.base_url, source, sort);
        let mut posts = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut after: Option<String> = None;

        while posts.len() < limit as usize {
            let mut url = format!("{base}?limit=100&raw_json=1");
            if let Some(cursor) = &after {
                url.push_str(&format!("&after={cursor}"));
            }
            let page = self.get_json(&url).await?;

            let children = page["data"]["children"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            if children.is_empty() {
                break;
            }
            for child in &children {
                match parse_post(&child["data"], source, sort) {
                    Ok(post) => {
                        if seen.insert(post.id.clone()) {
                            posts.push(post);
                        }
                    }
                    // One broken entry must not sink the page.
                    Err(e) => debug!(source, error = %e, "Skipping unparseable listing entry"),
                }
            }

            after = page["data"]["after"].as_str().map(String::from);
            if after.is_none() {
                break;
            }
            tokio::time::sleep(PAGE_DELAY).await;
        }

        debug!(source, sort = %sort, count = posts.len(), "Listing fetched");
        Ok(posts)
    }

    async fn fetch_comment_tree(
        &self,
        post_id: &str,
        permalink: &str,
    ) -> Result<Vec<CommentNode>> {
        let url = format!("{}{}.json?raw_json=1&limit=200", self.base_url, permalink);
        let data = self.get_json(&url).await?;

        // The endpoint returns [post_listing, comment_listing].
        let Some(comment_listing) = data.as_array().and_then(|a| a.get(1)) else {
            debug!(post_id, "No comment listing in response");
            return Ok(Vec::new());
        };
        Ok(parse_comment_listing(comment_listing))
    }
}

fn parse_post(d: &Value, source: &str, sort: SortOrder) -> Result<RawPost> {
    let id = d["id"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TrackerError::MalformedRecord("listing entry without an id".into()))?;

    let crosspost_parent = d["crosspost_parent_list"]
        .as_array()
        .and_then(|list| list.first())
        .and_then(|parent| parent["id"].as_str())
        .map(String::from);

    Ok(RawPost {
        id: id.to_string(),
        title: d["title"].as_str().unwrap_or_default().to_string(),
        body: d["selftext"].as_str().unwrap_or_default().to_string(),
        created_utc: d["created_utc"].as_f64().unwrap_or(0.0) as i64,
        score: d["score"].as_i64().unwrap_or(0),
        num_comments: d["num_comments"].as_i64().unwrap_or(0),
        permalink: d["permalink"].as_str().unwrap_or_default().to_string(),
        source: source.to_string(),
        sort_order: sort,
        crosspost_parent,
    })
}

/// Walk a comment Listing with an explicit work stack; arbitrarily deep
/// reply chains must not recurse on the call stack. The output is flat
/// (every reply level surfaces as its own node), which also means deleted
/// and bodiless comments simply drop out while their replies survive.
fn parse_comment_listing(listing: &Value) -> Vec<CommentNode> {
    let mut nodes = Vec::new();
    let mut stack = vec![listing];

    while let Some(listing) = stack.pop() {
        let Some(children) = listing["data"]["children"].as_array() else {
            continue;
        };
        for child in children {
            if child["kind"].as_str() != Some("t1") {
                continue;
            }
            let d = &child["data"];
            if let Value::Object(_) = &d["replies"] {
                stack.push(&d["replies"]);
            }

            let body = d["body"].as_str().unwrap_or_default();
            let id = d["id"].as_str().unwrap_or_default();
            if body.is_empty() || body == "[deleted]" || id.is_empty() {
                continue;
            }

            nodes.push(CommentNode {
                id: id.to_string(),
                body: body.to_string(),
                author: d["author"].as_str().unwrap_or_default().to_string(),
                score: d["score"].as_i64().unwrap_or(0),
                created_utc: d["created_utc"].as_f64().unwrap_or(0.0) as i64,
                replies: Vec::new(),
            });
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_post_requires_an_id() {
        let d = json!({"title": "no id here"});
        assert!(matches!(
            parse_post(&d, "birthcontrol", SortOrder::New),
            Err(TrackerError::MalformedRecord(_))
        ));
    }

    #[test]
    fn parse_post_extracts_crosspost_parent() {
        let d = json!({
            "id": "abc1",
            "title": "t",
            "selftext": "",
            "created_utc": 1700000000.0,
            "score": 3,
            "num_comments": 1,
            "permalink": "/r/birthcontrol/abc1",
            "crosspost_parent_list": [{"id": "orig9"}],
        });
        let post = parse_post(&d, "birthcontrol", SortOrder::Hot).unwrap();
        assert_eq!(post.crosspost_parent.as_deref(), Some("orig9"));
        assert_eq!(post.sort_order, SortOrder::Hot);
    }

    #[test]
    fn deleted_comments_are_dropped_but_replies_survive() {
        let listing = json!({
            "data": {"children": [
                {"kind": "t1", "data": {
                    "id": "c1", "body": "[deleted]", "author": "", "score": 0,
                    "created_utc": 0.0,
                    "replies": {"data": {"children": [
                        {"kind": "t1", "data": {
                            "id": "c2", "body": "still here", "author": "a",
                            "score": 1, "created_utc": 0.0, "replies": ""
                        }}
                    ]}}
                }}
            ]}
        });
        let nodes = parse_comment_listing(&listing);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "c2");
    }

    #[test]
    fn deep_reply_chains_parse_without_recursion() {
        // Each loop iteration wraps the previous listing one reply deeper.
        let mut listing = json!("");
        for i in 0..512 {
            listing = json!({"data": {"children": [
                {"kind": "t1", "data": {
                    "id": format!("c{i}"), "body": "text", "author": "a",
                    "score": 0, "created_utc": 0.0, "replies": listing,
                }}
            ]}});
        }
        assert_eq!(parse_comment_listing(&listing).len(), 512);
    }
}
