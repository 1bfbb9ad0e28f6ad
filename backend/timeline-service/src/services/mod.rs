pub mod assembler;
pub mod cursor;
pub mod scoring;
pub mod timeline;

pub use assembler::FeedAssembler;
pub use cursor::FeedCursor;
pub use scoring::{ScoreBreakdown, ScoringContext, ScoringEngine, ScoringWeights};
pub use timeline::TimelineService;
