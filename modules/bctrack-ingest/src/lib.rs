//! Ingestion pipeline: fetch listings from the configured forums, enrich
//! each record (lexicon tags, sentiment, engagement), and persist through
//! the store. The source client sits behind a trait so the whole pipeline
//! runs against a mock in tests.

pub mod backfill;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod testing;

pub use pipeline::{CycleStats, Tracker};
pub use source::{RedditClient, SourceClient};
