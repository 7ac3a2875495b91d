pub mod config;
pub mod engagement;
pub mod error;
pub mod lexicon;
pub mod sentiment;
pub mod types;

pub use config::{sources, Config, SourceConfig};
pub use engagement::engagement_score;
pub use error::{Result, TrackerError};
pub use lexicon::{Lexicon, LexiconMatch, LEXICON_VERSION};
pub use types::*;
