mod engine;
mod similarity;

pub use engine::{
    DedupConfig, DuplicateGroup, DuplicateReviewEngine, ResolveOutcome, ReviewSession,
};
pub use similarity::similarity;
