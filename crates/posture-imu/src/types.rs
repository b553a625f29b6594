use glam::DQuat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A tracked body region carrying one sensor.
///
/// The declaration order is the anatomical chain order: spine segments first,
/// root to top, then the shoulders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentName {
    LowerBack,
    MidBack,
    UpperBack,
    ShoulderRight,
    ShoulderLeft,
}

impl SegmentName {
    pub const ALL: [SegmentName; 5] = [
        SegmentName::LowerBack,
        SegmentName::MidBack,
        SegmentName::UpperBack,
        SegmentName::ShoulderRight,
        SegmentName::ShoulderLeft,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentName::LowerBack => "LowerBack",
            SegmentName::MidBack => "MidBack",
            SegmentName::UpperBack => "UpperBack",
            SegmentName::ShoulderRight => "ShoulderRight",
            SegmentName::ShoulderLeft => "ShoulderLeft",
        }
    }

    pub fn is_shoulder(self) -> bool {
        matches!(self, SegmentName::ShoulderRight | SegmentName::ShoulderLeft)
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown segment name: {0}")]
pub struct UnknownSegment(pub String);

impl FromStr for SegmentName {
    type Err = UnknownSegment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SegmentName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSegment(s.to_string()))
    }
}

/// Per-segment values, iterated in chain order.
pub type SegmentMap<T> = BTreeMap<SegmentName, T>;

/// One decoded notification: a raw orientation per physical sensor, in sensor index order.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub quaternions: Vec<DQuat>,
}

impl RawFrame {
    pub fn sensor_count(&self) -> usize {
        self.quaternions.len()
    }
}

/// Renormalize after composition so rounding error never accumulates into the magnitude.
pub(crate) fn renormalize(q: DQuat) -> DQuat {
    let len = q.length();
    if len > f64::EPSILON {
        q / len
    } else {
        q
    }
}
