use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sensor deployment and wire format.
    pub sensors: SensorConfig,
    /// Posture scoring tunables.
    pub scoring: ScoringConfig,
    /// Reading history and aggregation windows.
    pub history: HistoryConfig,
    /// Frame processing session.
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Which body segments carry a sensor.
    pub layout: LayoutKind,
    /// Byte order of the f64 values in each notification.
    pub byte_order: WireByteOrder,
    /// Sensor index -> segment name table. `None` uses the layout's default order.
    pub segment_order: Option<Vec<String>>,
}

impl SensorConfig {
    /// Number of physical sensors in one frame.
    pub fn sensor_count(&self) -> usize {
        match &self.segment_order {
            Some(order) => order.len(),
            None => self.layout.sensor_count(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            layout: LayoutKind::SpineAndShoulders,
            byte_order: WireByteOrder::Little,
            segment_order: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// LowerBack, MidBack, UpperBack.
    Spine,
    /// Spine plus ShoulderRight and ShoulderLeft.
    SpineAndShoulders,
}

impl LayoutKind {
    pub fn sensor_count(self) -> usize {
        match self {
            LayoutKind::Spine => 3,
            LayoutKind::SpineAndShoulders => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Deviation (degrees) at which a sub-score bottoms out at zero.
    pub max_deviation_deg: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_deviation_deg: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Offset of the wearer's local time from UTC, used for bucket boundaries.
    pub utc_offset_minutes: i32,
    /// First hour shown in the hourly chart (inclusive).
    pub hourly_start_hour: u32,
    /// Number of calendar days in the daily chart.
    pub daily_days: u32,
    /// Number of ISO weeks in the weekly chart.
    pub weekly_weeks: u32,
    /// JSON-lines file for persisted readings. `None` keeps history in memory only.
    pub store_path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            hourly_start_hour: 6,
            daily_days: 7,
            weekly_weeks: 4,
            store_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bounded queue depth between the transport and the fusion worker.
    pub frame_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 64,
        }
    }
}
