use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub spinal_straightness: f64,
    pub hunch: f64,
    pub shoulder_balance: f64,
}

impl SubScores {
    /// Wire order: spinal straightness, hunch, shoulder balance.
    pub fn to_array(self) -> [f64; 3] {
        [self.spinal_straightness, self.hunch, self.shoulder_balance]
    }

    pub fn from_array([spinal_straightness, hunch, shoulder_balance]: [f64; 3]) -> Self {
        Self {
            spinal_straightness,
            hunch,
            shoulder_balance,
        }
    }
}

/// One scored frame. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureReading {
    pub timestamp: DateTime<Utc>,
    pub composite_score: f64,
    pub sub_scores: SubScores,
}

impl PostureReading {
    /// All four values are finite and inside `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        std::iter::once(self.composite_score)
            .chain(self.sub_scores.to_array())
            .all(|v| v.is_finite() && (0.0..=1.0).contains(&v))
    }
}

/// Persisted shape of a reading: `{timestamp, compositeScore, subScores[3]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureRecord {
    pub timestamp: DateTime<Utc>,
    pub composite_score: f64,
    pub sub_scores: [f64; 3],
}

impl From<&PostureReading> for PostureRecord {
    fn from(reading: &PostureReading) -> Self {
        Self {
            timestamp: reading.timestamp,
            composite_score: reading.composite_score,
            sub_scores: reading.sub_scores.to_array(),
        }
    }
}

impl From<PostureRecord> for PostureReading {
    fn from(record: PostureRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            composite_score: record.composite_score,
            sub_scores: SubScores::from_array(record.sub_scores),
        }
    }
}
