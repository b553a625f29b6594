use crate::calibration::{ideal_orientation, CalibrationStore};
use crate::layout::{spine_axis_remap, SegmentKind, SensorLayout};
use crate::types::{renormalize, RawFrame, SegmentMap, SegmentName};
use glam::DQuat;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("Frame carries {actual} sensors, layout tracks {expected}")]
    IncompleteFrame { expected: usize, actual: usize },
    #[error("No calibration adjustment for {0} although calibration is complete")]
    StaleCalibration(SegmentName),
}

/// Which branch of the calibration state machine a frame went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionState {
    /// This frame became the calibration reference. Absolute = raw.
    Calibrating,
    /// Absolute = adjustment * raw.
    Calibrated,
}

/// Orientations derived from one frame.
#[derive(Debug, Clone)]
pub struct FusedFrame {
    /// Calibrated orientation of every tracked segment.
    pub absolute: SegmentMap<DQuat>,
    /// Rotation of each non-root segment relative to its reference segment.
    pub relative: SegmentMap<DQuat>,
    pub state: FusionState,
}

/// Turns raw per-sensor quaternions into absolute and inter-segment orientations.
///
/// The layout supplies the sensor order and each segment's [`SegmentKind`], so
/// spine and shoulder segments share one code path.
#[derive(Debug, Clone)]
pub struct OrientationFusion {
    layout: SensorLayout,
}

impl OrientationFusion {
    pub fn new(layout: SensorLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    /// A calibration store tracking exactly this layout's segments.
    pub fn calibration_store(&self) -> CalibrationStore {
        CalibrationStore::new(self.layout.segment_names())
    }

    /// Fuse one frame.
    ///
    /// While `calibration` is incomplete, the frame itself becomes the
    /// reference: every segment is recorded and its raw orientation is used
    /// as-is. Afterwards each raw orientation is corrected by its adjustment.
    pub fn fuse(
        &self,
        frame: &RawFrame,
        calibration: &mut CalibrationStore,
    ) -> Result<FusedFrame, FusionError> {
        let expected = self.layout.sensor_count();
        if frame.sensor_count() < expected {
            return Err(FusionError::IncompleteFrame {
                expected,
                actual: frame.sensor_count(),
            });
        }

        let mut absolute = SegmentMap::new();
        let state = if calibration.is_calibrated() {
            for (spec, raw) in self.layout.segments().iter().zip(&frame.quaternions) {
                let adjustment = calibration
                    .adjustment(spec.name)
                    .ok_or(FusionError::StaleCalibration(spec.name))?;
                absolute.insert(spec.name, renormalize(adjustment * renormalize(*raw)));
            }
            FusionState::Calibrated
        } else {
            for (spec, raw) in self.layout.segments().iter().zip(&frame.quaternions) {
                let raw = renormalize(*raw);
                absolute.insert(spec.name, raw);
                calibration.record_calibration(spec.name, raw);
            }
            FusionState::Calibrating
        };

        let relative = self.relative_rotations(&absolute);
        Ok(FusedFrame {
            absolute,
            relative,
            state,
        })
    }

    /// Derive each non-root segment's rotation relative to its reference segment.
    ///
    /// Segments whose reference is absent from `absolute` are skipped.
    pub fn relative_rotations(&self, absolute: &SegmentMap<DQuat>) -> SegmentMap<DQuat> {
        let mut relative = SegmentMap::new();
        for spec in self.layout.segments() {
            let Some(&current) = absolute.get(&spec.name) else {
                continue;
            };
            let rotation = match spec.kind {
                SegmentKind::Root => continue,
                SegmentKind::Spine { predecessor } => {
                    let Some(&previous) = absolute.get(&predecessor) else {
                        continue;
                    };
                    spine_axis_remap(current * previous.conjugate())
                }
                SegmentKind::Shoulder {
                    reference,
                    normalizer,
                    axis_swap,
                } => {
                    let Some(&reference) = absolute.get(&reference) else {
                        continue;
                    };
                    let shoulder = axis_swap.apply(current);
                    let reference = axis_swap.apply(reference);
                    normalizer * (shoulder * reference.conjugate())
                }
            };
            relative.insert(spec.name, renormalize(rotation));
        }
        relative
    }

    /// Relative rotations of the ideal pose: what a perfectly calibrated
    /// wearer standing in the reference posture produces.
    pub fn ideal_relative_rotations(&self) -> SegmentMap<DQuat> {
        let absolute: SegmentMap<DQuat> = self
            .layout
            .segment_names()
            .map(|name| (name, ideal_orientation(name)))
            .collect();
        self.relative_rotations(&absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{AxisSwap, SHOULDER_LEFT_NORMALIZER, SHOULDER_RIGHT_NORMALIZER};

    fn approx_eq(a: DQuat, b: DQuat) -> bool {
        a.dot(b).abs() > 1.0 - 1e-9
    }

    fn frame(quats: &[DQuat]) -> RawFrame {
        RawFrame {
            quaternions: quats.to_vec(),
        }
    }

    fn ideal_frame(layout: &SensorLayout) -> RawFrame {
        RawFrame {
            quaternions: layout.segment_names().map(ideal_orientation).collect(),
        }
    }

    #[test]
    fn first_frame_calibrates_and_passes_raw_through() {
        let fusion = OrientationFusion::new(SensorLayout::spine());
        let mut store = fusion.calibration_store();
        let raw = [
            DQuat::from_rotation_x(0.3),
            DQuat::from_rotation_y(0.2),
            DQuat::from_rotation_z(-0.1),
        ];

        let fused = fusion.fuse(&frame(&raw), &mut store).unwrap();

        assert_eq!(fused.state, FusionState::Calibrating);
        assert!(store.is_calibrated());
        assert_eq!(store.generation(), 1);
        assert!(approx_eq(fused.absolute[&SegmentName::LowerBack], raw[0]));
        assert!(approx_eq(fused.absolute[&SegmentName::UpperBack], raw[2]));
        assert!(!fused.relative.contains_key(&SegmentName::LowerBack));
        assert_eq!(fused.relative.len(), 2);
    }

    #[test]
    fn repeated_frame_calibrates_once() {
        let fusion = OrientationFusion::new(SensorLayout::spine());
        let mut store = fusion.calibration_store();
        let raw = frame(&[
            DQuat::from_rotation_x(0.3),
            DQuat::from_rotation_y(0.2),
            DQuat::from_rotation_z(-0.1),
        ]);

        fusion.fuse(&raw, &mut store).unwrap();
        let adjustment = store.adjustment(SegmentName::MidBack);
        let second = fusion.fuse(&raw, &mut store).unwrap();

        assert_eq!(second.state, FusionState::Calibrated);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.adjustment(SegmentName::MidBack), adjustment);
        // Same raw input as the calibration frame lands on the ideal pose.
        for name in [SegmentName::LowerBack, SegmentName::MidBack, SegmentName::UpperBack] {
            assert!(approx_eq(second.absolute[&name], ideal_orientation(name)));
        }
    }

    #[test]
    fn ideal_input_reproduces_ideal_orientation() {
        let layout = SensorLayout::spine_and_shoulders();
        let fusion = OrientationFusion::new(layout.clone());
        let mut store = fusion.calibration_store();
        let raw = ideal_frame(&layout);

        fusion.fuse(&raw, &mut store).unwrap();
        let fused = fusion.fuse(&raw, &mut store).unwrap();

        for name in layout.segment_names() {
            assert!(approx_eq(store.adjustment(name).unwrap(), DQuat::IDENTITY));
            assert!(approx_eq(fused.absolute[&name], ideal_orientation(name)));
        }
        let ideal = fusion.ideal_relative_rotations();
        for (name, rotation) in &fused.relative {
            assert!(approx_eq(*rotation, ideal[name]));
        }
    }

    #[test]
    fn spine_relative_is_remapped_against_predecessor() {
        let fusion = OrientationFusion::new(SensorLayout::spine());
        let mut absolute = SegmentMap::new();
        absolute.insert(SegmentName::LowerBack, DQuat::IDENTITY);
        absolute.insert(SegmentName::MidBack, DQuat::from_rotation_x(0.5));
        absolute.insert(SegmentName::UpperBack, DQuat::from_rotation_x(0.5));

        let relative = fusion.relative_rotations(&absolute);

        // A rotation about sensor x becomes a rotation about joint z.
        assert!(approx_eq(
            relative[&SegmentName::MidBack],
            DQuat::from_rotation_z(0.5)
        ));
        assert!(approx_eq(relative[&SegmentName::UpperBack], DQuat::IDENTITY));
    }

    #[test]
    fn shoulders_are_relative_to_upper_back_with_normalizer() {
        let fusion = OrientationFusion::new(SensorLayout::spine_and_shoulders());
        let upper = DQuat::from_rotation_y(0.3);
        let mut absolute = SegmentMap::new();
        absolute.insert(SegmentName::LowerBack, DQuat::IDENTITY);
        absolute.insert(SegmentName::MidBack, DQuat::from_rotation_x(0.7));
        absolute.insert(SegmentName::UpperBack, upper);
        absolute.insert(SegmentName::ShoulderRight, upper);
        absolute.insert(SegmentName::ShoulderLeft, upper);

        let relative = fusion.relative_rotations(&absolute);

        // Shoulders aligned with UpperBack leave only the normalizer, regardless of MidBack.
        assert!(approx_eq(
            relative[&SegmentName::ShoulderRight],
            SHOULDER_RIGHT_NORMALIZER
        ));
        assert!(approx_eq(
            relative[&SegmentName::ShoulderLeft],
            SHOULDER_LEFT_NORMALIZER
        ));
    }

    #[test]
    fn left_shoulder_goes_through_mirrored_swap() {
        let fusion = OrientationFusion::new(SensorLayout::spine_and_shoulders());
        let upper = DQuat::from_rotation_y(0.3);
        let raised = DQuat::from_rotation_x(0.3) * upper;
        let mut absolute = SegmentMap::new();
        absolute.insert(SegmentName::LowerBack, DQuat::IDENTITY);
        absolute.insert(SegmentName::MidBack, DQuat::IDENTITY);
        absolute.insert(SegmentName::UpperBack, upper);
        absolute.insert(SegmentName::ShoulderRight, raised);
        absolute.insert(SegmentName::ShoulderLeft, raised);

        let relative = fusion.relative_rotations(&absolute);

        let mirrored = AxisSwap::Mirrored;
        let expected_left = SHOULDER_LEFT_NORMALIZER
            * (mirrored.apply(raised) * mirrored.apply(upper).conjugate());
        let unswapped_left = SHOULDER_LEFT_NORMALIZER * (raised * upper.conjugate());
        assert!(approx_eq(relative[&SegmentName::ShoulderLeft], expected_left));
        assert!(!approx_eq(relative[&SegmentName::ShoulderLeft], unswapped_left));

        // The right shoulder is mounted as delivered.
        let expected_right = SHOULDER_RIGHT_NORMALIZER * (raised * upper.conjugate());
        assert!(approx_eq(relative[&SegmentName::ShoulderRight], expected_right));
    }

    #[test]
    fn short_frame_is_incomplete() {
        let fusion = OrientationFusion::new(SensorLayout::spine_and_shoulders());
        let mut store = fusion.calibration_store();
        let err = fusion
            .fuse(&frame(&[DQuat::IDENTITY; 3]), &mut store)
            .unwrap_err();

        assert_eq!(
            err,
            FusionError::IncompleteFrame {
                expected: 5,
                actual: 3
            }
        );
        assert!(!store.is_calibrated());
        assert!(store.adjustment(SegmentName::LowerBack).is_none());
    }

    #[test]
    fn store_from_another_layout_is_stale() {
        let fusion = OrientationFusion::new(SensorLayout::spine_and_shoulders());
        let mut store = OrientationFusion::new(SensorLayout::spine()).calibration_store();
        let spine = [DQuat::IDENTITY; 3];
        OrientationFusion::new(SensorLayout::spine())
            .fuse(&frame(&spine), &mut store)
            .unwrap();

        let err = fusion
            .fuse(&frame(&[DQuat::IDENTITY; 5]), &mut store)
            .unwrap_err();
        assert_eq!(err, FusionError::StaleCalibration(SegmentName::ShoulderRight));
    }
}
