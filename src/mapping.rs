//! Axis mapping from normalized client values to device-native range
//!
//! The mapper is pure and total: out-of-range input is clamped, never
//! rejected. Channel names the device does not expose are filtered out
//! before mapping via [`AxisChannel::from_name`].

use crate::packet::AxisMode;

/// Native maximum of the virtual device's axis range.
pub const DEVICE_MAX: u16 = 32767;

/// Axis channels exposed by the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisChannel {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Slider1,
    Slider2,
}

impl AxisChannel {
    /// All device channels, in HID usage order.
    pub fn all() -> &'static [AxisChannel] {
        &[
            AxisChannel::X,
            AxisChannel::Y,
            AxisChannel::Z,
            AxisChannel::Rx,
            AxisChannel::Ry,
            AxisChannel::Rz,
            AxisChannel::Slider1,
            AxisChannel::Slider2,
        ]
    }

    /// Resolve a wire-protocol channel name. Unknown names have no device
    /// target and return `None` (the packet entry stays valid for state).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "X" => Some(AxisChannel::X),
            "Y" => Some(AxisChannel::Y),
            "Z" => Some(AxisChannel::Z),
            "RX" => Some(AxisChannel::Rx),
            "RY" => Some(AxisChannel::Ry),
            "RZ" => Some(AxisChannel::Rz),
            "SLIDER1" => Some(AxisChannel::Slider1),
            "SLIDER2" => Some(AxisChannel::Slider2),

            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisChannel::X => "X",
            AxisChannel::Y => "Y",
            AxisChannel::Z => "Z",
            AxisChannel::Rx => "RX",
            AxisChannel::Ry => "RY",
            AxisChannel::Rz => "RZ",
            AxisChannel::Slider1 => "SLIDER1",
            AxisChannel::Slider2 => "SLIDER2",
        }
    }
}

impl std::fmt::Display for AxisChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a normalized axis value into the device-native integer range.
///
/// - `normal`: clamp to `[0, 1]`, scale to `[0, DEVICE_MAX]`
/// - `centered`: clamp to `[-1, 1]`, map so -1 → 0, 0 → midpoint, 1 → DEVICE_MAX
///
/// # Example
/// ```
/// use vpad_relay::mapping::{map_axis, DEVICE_MAX};
/// use vpad_relay::packet::AxisMode;
///
/// assert_eq!(map_axis(0.5, AxisMode::Normal), 16384);
/// assert_eq!(map_axis(0.0, AxisMode::Centered), DEVICE_MAX / 2 + 1);
/// ```
pub fn map_axis(value: f64, mode: AxisMode) -> u16 {
    let mapped = match mode {
        AxisMode::Normal => value.clamp(0.0, 1.0) * DEVICE_MAX as f64,
        AxisMode::Centered => (value.clamp(-1.0, 1.0) + 1.0) * DEVICE_MAX as f64 / 2.0,
    };
    mapped.round() as u16
}

/// Neutral device value for an axis mode: 0 for `normal` (released pedal),
/// midpoint for `centered` (stick at rest). Used when releasing channels on
/// disconnect.
pub fn neutral_value(mode: AxisMode) -> u16 {
    match mode {
        AxisMode::Normal => 0,
        AxisMode::Centered => map_axis(0.0, AxisMode::Centered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normal_endpoints() {
        assert_eq!(map_axis(0.0, AxisMode::Normal), 0);
        assert_eq!(map_axis(1.0, AxisMode::Normal), DEVICE_MAX);
        assert_eq!(map_axis(0.5, AxisMode::Normal), 16384);
    }

    #[test]
    fn test_centered_endpoints() {
        assert_eq!(map_axis(-1.0, AxisMode::Centered), 0);
        assert_eq!(map_axis(1.0, AxisMode::Centered), DEVICE_MAX);
        // round((0 + 1) * 32767 / 2) = round(16383.5) = 16384
        assert_eq!(map_axis(0.0, AxisMode::Centered), 16384);
    }

    #[test]
    fn test_out_of_range_clamps_to_boundary() {
        assert_eq!(
            map_axis(2.5, AxisMode::Normal),
            map_axis(1.0, AxisMode::Normal)
        );
        assert_eq!(
            map_axis(-0.3, AxisMode::Normal),
            map_axis(0.0, AxisMode::Normal)
        );
        assert_eq!(
            map_axis(-7.0, AxisMode::Centered),
            map_axis(-1.0, AxisMode::Centered)
        );
        assert_eq!(
            map_axis(42.0, AxisMode::Centered),
            map_axis(1.0, AxisMode::Centered)
        );
    }

    #[test]
    fn test_non_finite_input_does_not_panic() {
        // clamp() on NaN yields NaN; round+cast saturates to 0
        let _ = map_axis(f64::NAN, AxisMode::Normal);
        assert_eq!(map_axis(f64::INFINITY, AxisMode::Normal), DEVICE_MAX);
        assert_eq!(map_axis(f64::NEG_INFINITY, AxisMode::Centered), 0);
    }

    #[test]
    fn test_neutral_values() {
        assert_eq!(neutral_value(AxisMode::Normal), 0);
        assert_eq!(neutral_value(AxisMode::Centered), 16384);
    }

    #[test]
    fn test_channel_table() {
        assert_eq!(AxisChannel::from_name("X"), Some(AxisChannel::X));
        assert_eq!(AxisChannel::from_name("SLIDER2"), Some(AxisChannel::Slider2));
        assert_eq!(AxisChannel::from_name("WARP"), None);
        assert_eq!(AxisChannel::from_name("x"), None); // names are case-sensitive

        for ch in AxisChannel::all() {
            assert_eq!(AxisChannel::from_name(ch.as_str()), Some(*ch));
        }
    }

    proptest! {
        #[test]
        fn prop_normal_monotonic(a in -2.0f64..2.0, b in -2.0f64..2.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(map_axis(lo, AxisMode::Normal) <= map_axis(hi, AxisMode::Normal));
        }

        #[test]
        fn prop_centered_monotonic(a in -2.0f64..2.0, b in -2.0f64..2.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(map_axis(lo, AxisMode::Centered) <= map_axis(hi, AxisMode::Centered));
        }

        #[test]
        fn prop_output_in_device_range(v in -100.0f64..100.0) {
            prop_assert!(map_axis(v, AxisMode::Normal) <= DEVICE_MAX);
            prop_assert!(map_axis(v, AxisMode::Centered) <= DEVICE_MAX);
        }

        #[test]
        fn prop_clamping_idempotent(v in -100.0f64..100.0) {
            let clamped = v.clamp(0.0, 1.0);
            prop_assert_eq!(
                map_axis(v, AxisMode::Normal),
                map_axis(clamped, AxisMode::Normal)
            );
            let clamped = v.clamp(-1.0, 1.0);
            prop_assert_eq!(
                map_axis(v, AxisMode::Centered),
                map_axis(clamped, AxisMode::Centered)
            );
        }
    }
}
