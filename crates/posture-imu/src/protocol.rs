use crate::types::RawFrame;
use glam::DQuat;
use thiserror::Error;

/// Width of one wire value (f64).
pub const BYTES_PER_VALUE: usize = 8;
/// Quaternion components per sensor, in wire order w, x, y, z.
pub const VALUES_PER_SENSOR: usize = 4;
/// Bytes occupied by one sensor in a frame.
pub const BYTES_PER_SENSOR: usize = BYTES_PER_VALUE * VALUES_PER_SENSOR;

/// Quaternions shorter than this are treated as garbage rather than orientations.
const MIN_QUATERNION_LENGTH: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Frame has {actual} bytes, {required} required for {sensor_count} sensors")]
    InsufficientBytes {
        required: usize,
        actual: usize,
        sensor_count: usize,
    },
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Byte order of the f64 values written by the vest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Decodes sensor notifications into raw quaternions.
///
/// Sensor `i` occupies bytes `[32i, 32i + 32)`: four f64 values `w, x, y, z`.
/// Bytes past `32 * sensor_count` are ignored.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    sensor_count: usize,
    byte_order: ByteOrder,
}

impl FrameDecoder {
    pub fn new(sensor_count: usize, byte_order: ByteOrder) -> Self {
        Self {
            sensor_count,
            byte_order,
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    /// Exact frame length produced by the vest.
    pub fn frame_len(&self) -> usize {
        BYTES_PER_SENSOR.saturating_mul(self.sensor_count)
    }

    pub fn decode(&self, buffer: &[u8]) -> Result<RawFrame, DecodeError> {
        decode_with(buffer, self.sensor_count, self.byte_order)
            .map(|quaternions| RawFrame { quaternions })
    }
}

/// Decode a little-endian frame of `sensor_count` quaternions.
pub fn decode(buffer: &[u8], sensor_count: usize) -> Result<Vec<DQuat>, DecodeError> {
    decode_with(buffer, sensor_count, ByteOrder::Little)
}

/// Decode a frame of `sensor_count` quaternions with an explicit byte order.
pub fn decode_with(
    buffer: &[u8],
    sensor_count: usize,
    byte_order: ByteOrder,
) -> Result<Vec<DQuat>, DecodeError> {
    if sensor_count == 0 {
        return Err(DecodeError::MalformedFrame(
            "sensor count must be at least 1".into(),
        ));
    }

    let required = BYTES_PER_SENSOR.checked_mul(sensor_count).ok_or_else(|| {
        DecodeError::MalformedFrame(format!("sensor count {sensor_count} overflows the frame length"))
    })?;
    if buffer.len() < required {
        return Err(DecodeError::InsufficientBytes {
            required,
            actual: buffer.len(),
            sensor_count,
        });
    }

    let values: Vec<f64> = buffer[..required]
        .chunks_exact(BYTES_PER_VALUE)
        .map(|chunk| read_f64(chunk, byte_order))
        .collect();

    let expected_values = VALUES_PER_SENSOR * sensor_count;
    if values.len() < expected_values {
        return Err(DecodeError::MalformedFrame(format!(
            "extracted {} values, expected {expected_values}",
            values.len()
        )));
    }

    values
        .chunks_exact(VALUES_PER_SENSOR)
        .enumerate()
        .map(|(sensor, v)| {
            let q = DQuat::from_xyzw(v[1], v[2], v[3], v[0]);
            if !q.is_finite() {
                return Err(DecodeError::MalformedFrame(format!(
                    "sensor {sensor} has non-finite components"
                )));
            }
            if q.length() < MIN_QUATERNION_LENGTH {
                return Err(DecodeError::MalformedFrame(format!(
                    "sensor {sensor} has a zero-length quaternion"
                )));
            }
            Ok(q)
        })
        .collect()
}

fn read_f64(chunk: &[u8], byte_order: ByteOrder) -> f64 {
    let mut bytes = [0u8; BYTES_PER_VALUE];
    bytes.copy_from_slice(chunk);
    match byte_order {
        ByteOrder::Little => f64::from_le_bytes(bytes),
        ByteOrder::Big => f64::from_be_bytes(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a wire frame from (w, x, y, z) tuples.
    fn make_test_frame(quats: &[(f64, f64, f64, f64)], byte_order: ByteOrder) -> Vec<u8> {
        let mut frame = Vec::new();
        for &(w, x, y, z) in quats {
            for v in [w, x, y, z] {
                match byte_order {
                    ByteOrder::Little => frame.extend_from_slice(&v.to_le_bytes()),
                    ByteOrder::Big => frame.extend_from_slice(&v.to_be_bytes()),
                }
            }
        }
        frame
    }

    #[test]
    fn decodes_exact_length_frame() {
        let frame = make_test_frame(
            &[
                (1.0, 0.0, 0.0, 0.0),
                (0.5, 0.5, 0.5, 0.5),
                (0.0, 0.0, 0.0, 1.0),
            ],
            ByteOrder::Little,
        );
        assert_eq!(frame.len(), 96);

        let quats = decode(&frame, 3).unwrap();
        assert_eq!(quats.len(), 3);
        assert_eq!(quats[0], DQuat::IDENTITY);
        assert_eq!(quats[1], DQuat::from_xyzw(0.5, 0.5, 0.5, 0.5));
        // Wire order is w first; glam stores w last.
        assert_eq!(quats[2], DQuat::from_xyzw(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn one_byte_short_is_insufficient() {
        let frame = make_test_frame(&[(1.0, 0.0, 0.0, 0.0); 5], ByteOrder::Little);
        let err = decode(&frame[..frame.len() - 1], 5).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientBytes {
                required: 160,
                actual: 159,
                sensor_count: 5,
            }
        );
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let mut frame = make_test_frame(&[(1.0, 0.0, 0.0, 0.0); 3], ByteOrder::Little);
        frame.extend_from_slice(&[0xff; 7]);
        assert_eq!(decode(&frame, 3).unwrap().len(), 3);
    }

    #[test]
    fn rejects_non_finite_and_zero_quaternions() {
        let nan = make_test_frame(&[(f64::NAN, 0.0, 0.0, 0.0)], ByteOrder::Little);
        assert!(matches!(decode(&nan, 1), Err(DecodeError::MalformedFrame(_))));

        let zero = make_test_frame(&[(0.0, 0.0, 0.0, 0.0)], ByteOrder::Little);
        assert!(matches!(decode(&zero, 1), Err(DecodeError::MalformedFrame(_))));

        assert!(matches!(decode(&[], 0), Err(DecodeError::MalformedFrame(_))));
    }

    #[test]
    fn oversized_sensor_count_is_malformed() {
        let frame = make_test_frame(&[(1.0, 0.0, 0.0, 0.0)], ByteOrder::Little);
        assert!(matches!(
            decode(&frame, usize::MAX / 8),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert_eq!(FrameDecoder::new(usize::MAX, ByteOrder::Little).frame_len(), usize::MAX);
    }

    #[test]
    fn honours_big_endian_producers() {
        let frame = make_test_frame(&[(0.5, -0.5, 0.5, -0.5)], ByteOrder::Big);
        let decoder = FrameDecoder::new(1, ByteOrder::Big);
        let raw = decoder.decode(&frame).unwrap();
        assert_eq!(raw.sensor_count(), 1);
        assert_eq!(raw.quaternions[0], DQuat::from_xyzw(-0.5, 0.5, -0.5, 0.5));
        assert_eq!(decoder.frame_len(), 32);
    }
}
