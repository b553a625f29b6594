//! Posture scoring and reading history.

pub mod angles;
pub mod history;
pub mod reading;
pub mod scoring;
pub mod store;

pub use angles::{rotation_angle, EulerAngles};
pub use history::{
    format_hour, AggregationWindows, Bucket, BucketAverage, ReadingKey, ReadingsHistory,
    ScoreAverages, SortOrder,
};
pub use reading::{PostureReading, PostureRecord, SubScores};
pub use scoring::{PostureAngles, PostureScorer, ScoringError};
pub use store::{JsonLinesStore, MemoryStore, PersistenceError, ReadingStore};
