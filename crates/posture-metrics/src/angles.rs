use glam::{DMat3, DQuat};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Below this, `sqrt(m21² + m22²)` is treated as gimbal lock.
const GIMBAL_EPSILON: f64 = 1e-6;

/// Euler-like angles (radians) of a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    /// Rotation about x: `atan2(m21, m22)`.
    pub pitch: f64,
    /// `atan2(m20, sqrt(m21² + m22²))`.
    pub roll: f64,
    /// Rotation about z: `atan2(m10, m00)`.
    pub yaw: f64,
}

impl EulerAngles {
    /// Extract angles from a unit quaternion via its rotation matrix (`m[row][col]`).
    ///
    /// Near gimbal lock pitch is pinned to zero and the remaining rotation is
    /// attributed to yaw, so the result never contains NaN.
    pub fn from_quat(q: DQuat) -> Self {
        let m = DMat3::from_quat(q);
        let at = |row: usize, col: usize| m.col(col)[row];

        let cos_roll = (at(2, 1).powi(2) + at(2, 2).powi(2)).sqrt();
        if cos_roll < GIMBAL_EPSILON {
            return Self {
                pitch: 0.0,
                roll: FRAC_PI_2.copysign(at(2, 0)),
                yaw: (-at(0, 1)).atan2(at(1, 1)),
            };
        }

        Self {
            pitch: at(2, 1).atan2(at(2, 2)),
            roll: at(2, 0).atan2(cos_roll),
            yaw: at(1, 0).atan2(at(0, 0)),
        }
    }

    pub fn to_degrees(self) -> Self {
        Self {
            pitch: self.pitch.to_degrees(),
            roll: self.roll.to_degrees(),
            yaw: self.yaw.to_degrees(),
        }
    }
}

/// Total rotation angle of a unit quaternion, in `[0, π]`.
///
/// Equal to `2·acos(|w|)`, evaluated with atan2 to stay accurate near identity.
pub fn rotation_angle(q: DQuat) -> f64 {
    2.0 * q.xyz().length().atan2(q.w.abs())
}
