/// Engagement score for a post: log-scaled vote count plus comment count,
/// with comments weighted heavier since they signal active discussion.
/// Scores at or below zero are floored to 1 so the logs stay finite.
pub fn engagement_score(score: i64, num_comments: i64) -> f64 {
    let votes = score.max(1) as f64;
    let comments = num_comments.max(1) as f64;
    votes.log2() + 1.5 * comments.log2()
}
