//! # Axis Normalization
//!
//! Report bytes are unsigned 0-255 with the stick center at 128. A mapped
//! byte is re-centered, multiplied by the entry's scale and clamped so the
//! flight controller never sees a value outside -1.0..=1.0.
//!
//! The formula used is: `output = clamp((byte - 128) * scale, -1.0, 1.0)`
//!
//! ```
//! use phoenix_usb_reader::input::normalize::normalize_axis;
//!
//! assert_eq!(normalize_axis(128, 1.0 / 128.0), 0.0);
//! assert_eq!(normalize_axis(0, 1.0 / 128.0), -1.0);
//! assert_eq!(normalize_axis(255, 1.0), 1.0);
//! ```

/// Raw byte value of a centered axis.
pub const AXIS_CENTER: i16 = 128;

/// Lower bound of a normalized axis.
pub const AXIS_MIN: f32 = -1.0;

/// Upper bound of a normalized axis.
pub const AXIS_MAX: f32 = 1.0;

/// Re-centers, scales and clamps one report byte.
///
/// A negative `scale` flips the direction of the axis; the bounds stay the same.
#[must_use]
#[inline]
pub fn normalize_axis(raw: u8, scale: f32) -> f32 {
    let centered = f32::from(i16::from(raw) - AXIS_CENTER);
    (centered * scale).min(AXIS_MAX).max(AXIS_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_RANGE: f32 = 1.0 / 128.0;

    #[test]
    fn test_center_is_zero() {
        assert_eq!(normalize_axis(128, HALF_RANGE), 0.0);
        assert_eq!(normalize_axis(128, -HALF_RANGE), 0.0);
        assert_eq!(normalize_axis(128, 1000.0), 0.0);
    }

    #[test]
    fn test_full_deflection_positive() {
        // (255 - 128) / 128
        assert_eq!(normalize_axis(255, HALF_RANGE), 0.9921875);
    }

    #[test]
    fn test_full_deflection_negative_hits_bound_exactly() {
        assert_eq!(normalize_axis(0, HALF_RANGE), -1.0);
    }

    #[test]
    fn test_negative_scale_reverses_direction() {
        assert_eq!(normalize_axis(255, -HALF_RANGE), -0.9921875);
        assert_eq!(normalize_axis(0, -HALF_RANGE), 1.0);
    }

    #[test]
    fn test_large_scale_is_clamped() {
        assert_eq!(normalize_axis(255, 1.0), 1.0);
        assert_eq!(normalize_axis(0, 1.0), -1.0);
        assert_eq!(normalize_axis(255, -1.0), -1.0);
        assert_eq!(normalize_axis(0, -1.0), 1.0);
    }

    #[test]
    fn test_every_byte_stays_in_range() {
        for scale in [HALF_RANGE, -HALF_RANGE, 0.5, -0.5, 10.0, 0.0] {
            for raw in 0..=u8::MAX {
                let value = normalize_axis(raw, scale);
                assert!(
                    (AXIS_MIN..=AXIS_MAX).contains(&value),
                    "byte {} with scale {} produced {}",
                    raw,
                    scale,
                    value
                );
                let expected = ((f32::from(raw) - 128.0) * scale).clamp(-1.0, 1.0);
                assert_eq!(value, expected);
            }
        }
    }

    #[test]
    fn test_zero_scale_always_centers() {
        assert_eq!(normalize_axis(0, 0.0), 0.0);
        assert_eq!(normalize_axis(255, 0.0), 0.0);
    }
}
