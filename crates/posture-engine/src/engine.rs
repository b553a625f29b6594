use anyhow::Result;
use chrono::{DateTime, Utc};
use glam::DQuat;
use posture_config::{AppConfig, LayoutKind, WireByteOrder};
use posture_imu::{
    ByteOrder, CalibrationStore, DecodeError, FrameDecoder, FusionError, FusionState,
    OrientationFusion, SegmentMap, SegmentName, SensorLayout,
};
use posture_metrics::{EulerAngles, PostureReading, PostureScorer, ScoringError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Fusion(#[from] FusionError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Euler angles per non-root segment, for driving a skeletal model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkeletonPose {
    pub joints: SegmentMap<EulerAngles>,
}

impl SkeletonPose {
    pub fn from_relative(relative: &SegmentMap<DQuat>) -> Self {
        Self {
            joints: relative
                .iter()
                .filter(|(_, q)| q.is_finite())
                .map(|(name, q)| (*name, EulerAngles::from_quat(*q)))
                .collect(),
        }
    }

    pub fn joint(&self, segment: SegmentName) -> Option<EulerAngles> {
        self.joints.get(&segment).copied()
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub skeleton: SkeletonPose,
    /// `None` for the frame that performed calibration.
    pub reading: Option<PostureReading>,
    pub state: FusionState,
}

/// Decode -> fuse -> score for one wearing session.
///
/// Owns the session's calibration, so a single `&mut` borrow serializes
/// every frame and every recalibration.
pub struct PostureEngine {
    decoder: FrameDecoder,
    fusion: OrientationFusion,
    calibration: CalibrationStore,
    scorer: PostureScorer,
    frames: u64,
}

impl PostureEngine {
    pub fn new(layout: SensorLayout, byte_order: ByteOrder) -> Self {
        let fusion = OrientationFusion::new(layout);
        Self {
            decoder: FrameDecoder::new(fusion.layout().sensor_count(), byte_order),
            calibration: fusion.calibration_store(),
            scorer: PostureScorer::for_fusion(&fusion),
            fusion,
            frames: 0,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let layout = match &config.sensors.segment_order {
            Some(names) => SensorLayout::from_names(names)?,
            None => match config.sensors.layout {
                LayoutKind::Spine => SensorLayout::spine(),
                LayoutKind::SpineAndShoulders => SensorLayout::spine_and_shoulders(),
            },
        };
        let byte_order = match config.sensors.byte_order {
            WireByteOrder::Little => ByteOrder::Little,
            WireByteOrder::Big => ByteOrder::Big,
        };
        tracing::info!(
            sensors = layout.sensor_count(),
            ?byte_order,
            max_deviation_deg = config.scoring.max_deviation_deg,
            "Posture engine configured"
        );
        Ok(Self::new(layout, byte_order)
            .with_max_deviation(config.scoring.max_deviation_deg.to_radians()))
    }

    pub fn with_max_deviation(mut self, radians: f64) -> Self {
        self.scorer = self.scorer.with_max_deviation(radians);
        self
    }

    /// Bytes per frame expected from the transport.
    pub fn frame_len(&self) -> usize {
        self.decoder.frame_len()
    }

    pub fn layout(&self) -> &SensorLayout {
        self.fusion.layout()
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Arm recalibration: every adjustment is dropped together and the next
    /// frame becomes the new reference.
    pub fn recalibrate(&mut self) {
        self.calibration.clear();
        tracing::info!("Recalibration armed");
    }

    /// Process one raw notification.
    pub fn process_frame(
        &mut self,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome, EngineError> {
        let raw = self.decoder.decode(bytes)?;
        let fused = self.fusion.fuse(&raw, &mut self.calibration)?;
        self.frames += 1;

        let skeleton = SkeletonPose::from_relative(&fused.relative);
        let reading = match fused.state {
            FusionState::Calibrating => None,
            FusionState::Calibrated => Some(self.scorer.score(&fused.relative, now)?),
        };

        if let Some(reading) = &reading {
            tracing::trace!(
                frame = self.frames,
                composite = reading.composite_score,
                "Frame scored"
            );
        }

        Ok(FrameOutcome {
            skeleton,
            reading,
            state: fused.state,
        })
    }
}
