use crate::angles::{rotation_angle, EulerAngles};
use crate::reading::{PostureReading, SubScores};
use chrono::{DateTime, Utc};
use glam::DQuat;
use posture_imu::{OrientationFusion, SegmentMap, SegmentName};
use thiserror::Error;

pub const SPINAL_STRAIGHTNESS_WEIGHT: f64 = 0.2;
pub const HUNCH_WEIGHT: f64 = 0.4;
pub const SHOULDER_BALANCE_WEIGHT: f64 = 0.4;

/// Deviation at which a sub-score reaches zero.
pub const DEFAULT_MAX_DEVIATION_DEG: f64 = 25.0;

const MIN_ROTATION_LENGTH: f64 = 1e-6;

/// Spine segments every score needs.
const SPINE_SEGMENTS: [SegmentName; 2] = [SegmentName::MidBack, SegmentName::UpperBack];

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("No relative rotation for {0}")]
    MissingSegment(SegmentName),
    #[error("Relative rotation for {0} is not a usable rotation")]
    DegenerateRotation(SegmentName),
}

/// Raw deviation angles (radians) before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureAngles {
    /// `|yaw(MidBack)| + |yaw(UpperBack)|`.
    pub spinal_straightness: f64,
    /// `|pitch(MidBack)| + |pitch(UpperBack)|`.
    pub hunch: f64,
    /// Mean shoulder deviation. `None` when the layout has no shoulders.
    pub shoulder_balance: Option<f64>,
}

/// Converts relative rotations into a weighted posture score.
///
/// Every angle is measured against the segment's ideal relative rotation,
/// so the calibrated reference pose scores a perfect 1.0.
#[derive(Debug, Clone)]
pub struct PostureScorer {
    reference: SegmentMap<DQuat>,
    shoulders: Vec<SegmentName>,
    max_deviation: f64,
}

impl PostureScorer {
    /// `reference` holds the ideal relative rotation of each scored segment.
    /// Shoulders present in it become required inputs.
    pub fn new(reference: SegmentMap<DQuat>) -> Self {
        let shoulders = reference
            .keys()
            .copied()
            .filter(|name| name.is_shoulder())
            .collect();
        Self {
            reference,
            shoulders,
            max_deviation: DEFAULT_MAX_DEVIATION_DEG.to_radians(),
        }
    }

    /// Scorer for the ideal pose of a fusion layout.
    pub fn for_fusion(fusion: &OrientationFusion) -> Self {
        Self::new(fusion.ideal_relative_rotations())
    }

    pub fn with_max_deviation(mut self, radians: f64) -> Self {
        self.max_deviation = radians.max(f64::EPSILON);
        self
    }

    pub fn max_deviation(&self) -> f64 {
        self.max_deviation
    }

    /// Measure the three deviation angles.
    pub fn measure(&self, relative: &SegmentMap<DQuat>) -> Result<PostureAngles, ScoringError> {
        let [mid, upper] = SPINE_SEGMENTS;
        let mid = EulerAngles::from_quat(self.deviation(relative, mid)?);
        let upper = EulerAngles::from_quat(self.deviation(relative, upper)?);

        let mut shoulder_total = 0.0;
        for &shoulder in &self.shoulders {
            shoulder_total += rotation_angle(self.deviation(relative, shoulder)?);
        }
        let shoulder_balance =
            (!self.shoulders.is_empty()).then(|| shoulder_total / self.shoulders.len() as f64);

        Ok(PostureAngles {
            spinal_straightness: mid.yaw.abs() + upper.yaw.abs(),
            hunch: mid.pitch.abs() + upper.pitch.abs(),
            shoulder_balance,
        })
    }

    /// Score one frame's relative rotations.
    pub fn score(
        &self,
        relative: &SegmentMap<DQuat>,
        timestamp: DateTime<Utc>,
    ) -> Result<PostureReading, ScoringError> {
        let angles = self.measure(relative)?;
        let sub_scores = SubScores {
            spinal_straightness: self.normalize(angles.spinal_straightness),
            hunch: self.normalize(angles.hunch),
            // Spine-only deployments cannot be penalized for shoulders.
            shoulder_balance: angles.shoulder_balance.map_or(1.0, |a| self.normalize(a)),
        };
        let composite = SPINAL_STRAIGHTNESS_WEIGHT * sub_scores.spinal_straightness
            + HUNCH_WEIGHT * sub_scores.hunch
            + SHOULDER_BALANCE_WEIGHT * sub_scores.shoulder_balance;

        Ok(PostureReading {
            timestamp,
            composite_score: composite.clamp(0.0, 1.0),
            sub_scores,
        })
    }

    /// `1 - min(|angle| / max_deviation, 1)`.
    pub fn normalize(&self, angle: f64) -> f64 {
        1.0 - (angle.abs() / self.max_deviation).min(1.0)
    }

    fn deviation(
        &self,
        relative: &SegmentMap<DQuat>,
        segment: SegmentName,
    ) -> Result<DQuat, ScoringError> {
        let q = relative
            .get(&segment)
            .copied()
            .ok_or(ScoringError::MissingSegment(segment))?;
        if !q.is_finite() || q.length() < MIN_ROTATION_LENGTH {
            return Err(ScoringError::DegenerateRotation(segment));
        }
        let ideal = self
            .reference
            .get(&segment)
            .copied()
            .unwrap_or(DQuat::IDENTITY);
        Ok((q.normalize() * ideal.conjugate()).normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_imu::SensorLayout;

    fn identity_reference(names: &[SegmentName]) -> SegmentMap<DQuat> {
        names.iter().map(|&n| (n, DQuat::IDENTITY)).collect()
    }

    fn relative(entries: &[(SegmentName, DQuat)]) -> SegmentMap<DQuat> {
        entries.iter().copied().collect()
    }

    #[test]
    fn weights_sum_to_one() {
        assert_eq!(
            SPINAL_STRAIGHTNESS_WEIGHT + HUNCH_WEIGHT + SHOULDER_BALANCE_WEIGHT,
            1.0
        );
    }

    #[test]
    fn empty_input_is_missing_segment() {
        let scorer = PostureScorer::new(identity_reference(&SPINE_SEGMENTS));
        assert_eq!(
            scorer.score(&SegmentMap::new(), Utc::now()),
            Err(ScoringError::MissingSegment(SegmentName::MidBack))
        );
    }

    #[test]
    fn missing_shoulder_fails_when_layout_has_shoulders() {
        let scorer = PostureScorer::for_fusion(&OrientationFusion::new(
            SensorLayout::spine_and_shoulders(),
        ));
        let mut input = scorer.reference.clone();
        input.remove(&SegmentName::ShoulderLeft);
        assert_eq!(
            scorer.score(&input, Utc::now()),
            Err(ScoringError::MissingSegment(SegmentName::ShoulderLeft))
        );
    }

    #[test]
    fn non_finite_rotation_is_degenerate() {
        let scorer = PostureScorer::new(identity_reference(&SPINE_SEGMENTS));
        let input = relative(&[
            (SegmentName::MidBack, DQuat::from_xyzw(f64::NAN, 0.0, 0.0, 1.0)),
            (SegmentName::UpperBack, DQuat::IDENTITY),
        ]);
        assert_eq!(
            scorer.measure(&input),
            Err(ScoringError::DegenerateRotation(SegmentName::MidBack))
        );
    }

    #[test]
    fn ideal_pose_scores_one() {
        for layout in [SensorLayout::spine(), SensorLayout::spine_and_shoulders()] {
            let fusion = OrientationFusion::new(layout);
            let scorer = PostureScorer::for_fusion(&fusion);
            let reading = scorer
                .score(&fusion.ideal_relative_rotations(), Utc::now())
                .unwrap();
            assert!((reading.composite_score - 1.0).abs() < 1e-9);
            assert!((reading.sub_scores.hunch - 1.0).abs() < 1e-9);
            assert!((reading.sub_scores.spinal_straightness - 1.0).abs() < 1e-9);
            assert!((reading.sub_scores.shoulder_balance - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn hunch_uses_pitch_and_spinal_uses_yaw() {
        let scorer = PostureScorer::new(identity_reference(&SPINE_SEGMENTS));
        let pitch = 10f64.to_radians();
        let yaw = 5f64.to_radians();
        let input = relative(&[
            (SegmentName::MidBack, DQuat::from_rotation_x(pitch)),
            (SegmentName::UpperBack, DQuat::from_rotation_z(-yaw)),
        ]);

        let angles = scorer.measure(&input).unwrap();
        assert!((angles.hunch - pitch).abs() < 1e-9);
        assert!((angles.spinal_straightness - yaw).abs() < 1e-9);
        assert_eq!(angles.shoulder_balance, None);

        let reading = scorer.score(&input, Utc::now()).unwrap();
        assert!((reading.sub_scores.hunch - (1.0 - 10.0 / 25.0)).abs() < 1e-9);
        assert!((reading.sub_scores.spinal_straightness - (1.0 - 5.0 / 25.0)).abs() < 1e-9);
        let expected = 0.2 * 0.8 + 0.4 * 0.6 + 0.4 * 1.0;
        assert!((reading.composite_score - expected).abs() < 1e-9);
    }

    #[test]
    fn shoulder_balance_averages_both_sides() {
        let scorer = PostureScorer::new(identity_reference(&[
            SegmentName::MidBack,
            SegmentName::UpperBack,
            SegmentName::ShoulderRight,
            SegmentName::ShoulderLeft,
        ]));
        let input = relative(&[
            (SegmentName::MidBack, DQuat::IDENTITY),
            (SegmentName::UpperBack, DQuat::IDENTITY),
            (SegmentName::ShoulderRight, DQuat::from_rotation_y(20f64.to_radians())),
            (SegmentName::ShoulderLeft, DQuat::IDENTITY),
        ]);

        let angles = scorer.measure(&input).unwrap();
        let balance = angles.shoulder_balance.unwrap();
        assert!((balance - 10f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn large_deviation_clamps_to_zero() {
        let scorer = PostureScorer::new(identity_reference(&[
            SegmentName::MidBack,
            SegmentName::UpperBack,
            SegmentName::ShoulderRight,
        ]));
        let input = relative(&[
            (SegmentName::MidBack, DQuat::from_rotation_x(1.2)),
            (SegmentName::UpperBack, DQuat::from_rotation_z(1.2)),
            (SegmentName::ShoulderRight, DQuat::from_rotation_y(2.5)),
        ]);

        let reading = scorer.score(&input, Utc::now()).unwrap();
        assert_eq!(reading.composite_score, 0.0);
        assert_eq!(reading.sub_scores.to_array(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let scorer = PostureScorer::new(identity_reference(&[
            SegmentName::MidBack,
            SegmentName::UpperBack,
            SegmentName::ShoulderRight,
            SegmentName::ShoulderLeft,
        ]));
        for i in 0..50 {
            let t = i as f64 * 0.13;
            let input = relative(&[
                (SegmentName::MidBack, DQuat::from_euler(glam::EulerRot::XYZ, t, -t, 0.5 * t)),
                (SegmentName::UpperBack, DQuat::from_rotation_y(t)),
                (SegmentName::ShoulderRight, DQuat::from_rotation_z(-t)),
                (SegmentName::ShoulderLeft, DQuat::from_rotation_x(2.0 * t)),
            ]);
            let reading = scorer.score(&input, Utc::now()).unwrap();
            assert!((0.0..=1.0).contains(&reading.composite_score));
            for s in reading.sub_scores.to_array() {
                assert!((0.0..=1.0).contains(&s));
            }
        }
    }
}
