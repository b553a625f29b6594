use crate::types::{renormalize, SegmentMap, SegmentName};
use glam::DQuat;
use std::f64::consts::FRAC_1_SQRT_2;

/// Design-time reference pose for a segment.
///
/// The shoulders are mirrored across the sagittal plane (y and z flipped),
/// so they are not simple negations of each other.
pub fn ideal_orientation(segment: SegmentName) -> DQuat {
    match segment {
        SegmentName::LowerBack | SegmentName::MidBack => {
            DQuat::from_xyzw(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2)
        }
        SegmentName::UpperBack => DQuat::from_xyzw(0.0, 0.0, -FRAC_1_SQRT_2, FRAC_1_SQRT_2),
        SegmentName::ShoulderRight => DQuat::from_xyzw(0.5, 0.5, -0.5, 0.5),
        SegmentName::ShoulderLeft => DQuat::from_xyzw(0.5, -0.5, 0.5, 0.5),
    }
}

/// Per-segment calibration adjustments for one wearing session.
///
/// `adjustment = ideal * raw.conjugate()`, captured while the wearer holds the ideal pose.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    tracked: Vec<SegmentName>,
    adjustments: SegmentMap<DQuat>,
    generation: u64,
}

impl CalibrationStore {
    pub fn new(tracked: impl IntoIterator<Item = SegmentName>) -> Self {
        Self {
            tracked: tracked.into_iter().collect(),
            adjustments: SegmentMap::new(),
            generation: 0,
        }
    }

    pub fn ideal_orientation(&self, segment: SegmentName) -> DQuat {
        ideal_orientation(segment)
    }

    /// Capture the adjustment that maps `raw` onto the segment's ideal pose.
    ///
    /// Last write wins. Completing the tracked set bumps the generation.
    pub fn record_calibration(&mut self, segment: SegmentName, raw: DQuat) -> DQuat {
        let was_calibrated = self.is_calibrated();
        let adjustment = renormalize(ideal_orientation(segment) * raw.conjugate());
        self.adjustments.insert(segment, adjustment);

        if !was_calibrated && self.is_calibrated() {
            self.generation += 1;
            tracing::info!(
                generation = self.generation,
                segments = self.tracked.len(),
                "Calibration complete"
            );
        }
        adjustment
    }

    pub fn adjustment(&self, segment: SegmentName) -> Option<DQuat> {
        self.adjustments.get(&segment).copied()
    }

    /// True once every tracked segment has an adjustment.
    pub fn is_calibrated(&self) -> bool {
        !self.tracked.is_empty()
            && self
                .tracked
                .iter()
                .all(|segment| self.adjustments.contains_key(segment))
    }

    /// Drop every adjustment at once so the next frame re-derives the whole set.
    pub fn clear(&mut self) {
        self.adjustments = SegmentMap::new();
        tracing::info!(generation = self.generation, "Calibration cleared");
    }

    /// Number of completed calibrations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tracked(&self) -> &[SegmentName] {
        &self.tracked
    }
}
