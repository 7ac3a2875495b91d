//! SQLite persistence for the mention tracker.
//!
//! All durable state lives here. Writes are idempotent upserts keyed on the
//! source platform's ids; reads are parameterized aggregations with stable
//! orderings.

mod queries;
mod store;

pub use queries::{
    CommentRow, DailyCount, EffectCount, ErrorRow, MatrixCell, MentionCount,
    MethodSentiment, PostRow, QueryFilter, Stats, ValidationPost,
};
pub use store::{
    InsertComment, InsertError, InsertPost, InsertRun, PendingComments,
    StaleComment, StalePost, Store,
};
