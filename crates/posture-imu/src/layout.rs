use crate::types::{SegmentName, UnknownSegment};
use glam::DQuat;
use std::f64::consts::FRAC_1_SQRT_2;
use thiserror::Error;

/// Fixed correction applied after composing the right shoulder against UpperBack.
pub const SHOULDER_RIGHT_NORMALIZER: DQuat = DQuat::from_xyzw(0.0, 0.0, -FRAC_1_SQRT_2, FRAC_1_SQRT_2);
/// Fixed correction applied after composing the left shoulder against UpperBack.
pub const SHOULDER_LEFT_NORMALIZER: DQuat = DQuat::from_xyzw(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Layout is missing required segment {0}")]
    MissingSegment(SegmentName),
    #[error("Segment {0} appears more than once in the layout")]
    DuplicateSegment(SegmentName),
    #[error(transparent)]
    Unknown(#[from] UnknownSegment),
}

/// Component relabeling applied to a quaternion to match a sensor's mounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSwap {
    /// Components used as delivered.
    Identity,
    /// Mirrored mounting: `(x, y, z, w) -> (y, -z, -x, w)`.
    Mirrored,
}

impl AxisSwap {
    pub fn apply(self, q: DQuat) -> DQuat {
        match self {
            AxisSwap::Identity => q,
            AxisSwap::Mirrored => DQuat::from_xyzw(q.y, -q.z, -q.x, q.w),
        }
    }
}

/// Aligns a spine joint's local axes with the skeleton: `(x, y, z, w) -> (z, -y, x, w)`.
pub fn spine_axis_remap(q: DQuat) -> DQuat {
    DQuat::from_xyzw(q.z, -q.y, q.x, q.w)
}

/// How a segment's relative rotation is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    /// Chain root. Has no relative rotation.
    Root,
    /// Relative to the previous spine segment, then axis-remapped.
    Spine { predecessor: SegmentName },
    /// Relative to a fixed reference segment, with its own mounting swap and normalizer.
    Shoulder {
        reference: SegmentName,
        normalizer: DQuat,
        axis_swap: AxisSwap,
    },
}

impl SegmentKind {
    /// The anatomical role of a segment.
    pub fn of(name: SegmentName) -> Self {
        match name {
            SegmentName::LowerBack => SegmentKind::Root,
            SegmentName::MidBack => SegmentKind::Spine {
                predecessor: SegmentName::LowerBack,
            },
            SegmentName::UpperBack => SegmentKind::Spine {
                predecessor: SegmentName::MidBack,
            },
            SegmentName::ShoulderRight => SegmentKind::Shoulder {
                reference: SegmentName::UpperBack,
                normalizer: SHOULDER_RIGHT_NORMALIZER,
                axis_swap: AxisSwap::Identity,
            },
            SegmentName::ShoulderLeft => SegmentKind::Shoulder {
                reference: SegmentName::UpperBack,
                normalizer: SHOULDER_LEFT_NORMALIZER,
                axis_swap: AxisSwap::Mirrored,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpec {
    pub name: SegmentName,
    pub kind: SegmentKind,
}

/// Static sensor-index -> segment table for one deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorLayout {
    segments: Vec<SegmentSpec>,
}

impl SensorLayout {
    /// Three spine sensors.
    pub fn spine() -> Self {
        Self::build(&SegmentName::ALL[..3])
    }

    /// Spine plus both shoulders.
    pub fn spine_and_shoulders() -> Self {
        Self::build(&SegmentName::ALL)
    }

    /// Custom sensor order. The three spine segments are mandatory, shoulders optional.
    pub fn from_order(order: &[SegmentName]) -> Result<Self, LayoutError> {
        for (i, name) in order.iter().enumerate() {
            if order[..i].contains(name) {
                return Err(LayoutError::DuplicateSegment(*name));
            }
        }
        for required in [
            SegmentName::LowerBack,
            SegmentName::MidBack,
            SegmentName::UpperBack,
        ] {
            if !order.contains(&required) {
                return Err(LayoutError::MissingSegment(required));
            }
        }
        Ok(Self::build(order))
    }

    /// Parse a custom order from configuration strings.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, LayoutError> {
        let order = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<SegmentName>, _>>()?;
        Self::from_order(&order)
    }

    fn build(order: &[SegmentName]) -> Self {
        Self {
            segments: order
                .iter()
                .map(|&name| SegmentSpec {
                    name,
                    kind: SegmentKind::of(name),
                })
                .collect(),
        }
    }

    /// Number of sensors expected per frame.
    pub fn sensor_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments in sensor index order.
    pub fn segments(&self) -> &[SegmentSpec] {
        &self.segments
    }

    pub fn segment_names(&self) -> impl Iterator<Item = SegmentName> + '_ {
        self.segments.iter().map(|s| s.name)
    }

    pub fn contains(&self, name: SegmentName) -> bool {
        self.segments.iter().any(|s| s.name == name)
    }

    pub fn has_shoulders(&self) -> bool {
        self.segments.iter().any(|s| s.name.is_shoulder())
    }
}
