pub mod engine;
pub mod error;

pub use engine::{LikeOutcome, MatchEngine};
pub use error::EngineError;
