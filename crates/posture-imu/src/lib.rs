//! Sensor side of the posture vest: wire decoding, segment layouts,
//! calibration and orientation fusion.

pub mod calibration;
pub mod fusion;
pub mod layout;
pub mod protocol;
pub mod types;

pub use calibration::{ideal_orientation, CalibrationStore};
pub use fusion::{FusedFrame, FusionError, FusionState, OrientationFusion};
pub use layout::{AxisSwap, LayoutError, SegmentKind, SegmentSpec, SensorLayout};
pub use protocol::{decode, decode_with, ByteOrder, DecodeError, FrameDecoder};
pub use types::{RawFrame, SegmentMap, SegmentName, UnknownSegment};
