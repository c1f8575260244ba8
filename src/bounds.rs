use crate::types::{PoseSample, TrackingBounds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Which side of an axis range a position fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Below,
    Above,
}

/// Result of checking one sample against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleClass {
    InBounds,
    /// First violated axis in x, y, z order.
    OutOfBounds(Axis, Direction),
    /// Zeroed, non-finite, or flagged invalid by the source.
    Invalid,
}

bitflags::bitflags! {
    /// Every bound limit a position exceeds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct AxisViolations: u8 {
        const X_BELOW = 1 << 0;
        const X_ABOVE = 1 << 1;
        const Y_BELOW = 1 << 2;
        const Y_ABOVE = 1 << 3;
        const Z_BELOW = 1 << 4;
        const Z_ABOVE = 1 << 5;
    }
}

impl AxisViolations {
    fn flag(axis: Axis, direction: Direction) -> Self {
        match (axis, direction) {
            (Axis::X, Direction::Below) => Self::X_BELOW,
            (Axis::X, Direction::Above) => Self::X_ABOVE,
            (Axis::Y, Direction::Below) => Self::Y_BELOW,
            (Axis::Y, Direction::Above) => Self::Y_ABOVE,
            (Axis::Z, Direction::Below) => Self::Z_BELOW,
            (Axis::Z, Direction::Above) => Self::Z_ABOVE,
        }
    }
}

/// Classify a sample against the bounds. Pure; never mutates the sample.
pub fn classify(sample: &PoseSample, bounds: &TrackingBounds) -> SampleClass {
    if !sample.valid || !sample.is_finite() || sample.is_zeroed() {
        return SampleClass::Invalid;
    }
    match first_violation(sample, bounds) {
        Some((axis, direction)) => SampleClass::OutOfBounds(axis, direction),
        None => SampleClass::InBounds,
    }
}

/// All exceeded limits for a sample's position. Empty for in-bounds positions.
/// Non-finite coordinates compare false against every limit and report nothing.
pub fn violations(sample: &PoseSample, bounds: &TrackingBounds) -> AxisViolations {
    let mut out = AxisViolations::empty();
    for (axis, (min, max)) in Axis::ALL.into_iter().zip(bounds.limits()) {
        let v = sample.position[axis.index()];
        if v < min {
            out |= AxisViolations::flag(axis, Direction::Below);
        } else if v > max {
            out |= AxisViolations::flag(axis, Direction::Above);
        }
    }
    out
}

fn first_violation(sample: &PoseSample, bounds: &TrackingBounds) -> Option<(Axis, Direction)> {
    Axis::ALL
        .into_iter()
        .zip(bounds.limits())
        .find_map(|(axis, (min, max))| {
            let v = sample.position[axis.index()];
            if v < min {
                Some((axis, Direction::Below))
            } else if v > max {
                Some((axis, Direction::Above))
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(position: [f64; 3]) -> PoseSample {
        PoseSample::new(position, [0.0, 5.0, 0.0], 1.0)
    }

    #[test]
    fn test_zeroed_sample_invalid() {
        let s = PoseSample::new([0.0; 3], [0.0; 3], 1.0);
        let b = TrackingBounds::default();
        assert_eq!(classify(&s, &b), SampleClass::Invalid);
        // idempotent
        assert_eq!(classify(&s, &b), SampleClass::Invalid);
    }

    #[test]
    fn test_zero_position_with_rotation_not_invalid() {
        let b = TrackingBounds {
            z_min: -1.0,
            ..TrackingBounds::default()
        };
        assert_eq!(classify(&at([0.0; 3]), &b), SampleClass::InBounds);
    }

    #[test]
    fn test_non_finite_and_flagged_invalid() {
        let b = TrackingBounds::default();
        let nan = PoseSample::new([0.0, f64::NAN, 1.0], [0.0; 3], 1.0);
        assert_eq!(classify(&nan, &b), SampleClass::Invalid);

        let mut flagged = at([0.0, 0.0, 1.0]);
        flagged.valid = false;
        assert_eq!(classify(&flagged, &b), SampleClass::Invalid);
    }

    #[test]
    fn test_out_of_bounds_each_axis() {
        let b = TrackingBounds::default();
        assert_eq!(
            classify(&at([2.5, 0.0, 1.0]), &b),
            SampleClass::OutOfBounds(Axis::X, Direction::Above)
        );
        assert_eq!(
            classify(&at([0.0, -1.6, 1.0]), &b),
            SampleClass::OutOfBounds(Axis::Y, Direction::Below)
        );
        assert_eq!(
            classify(&at([0.0, 0.0, 3.5]), &b),
            SampleClass::OutOfBounds(Axis::Z, Direction::Above)
        );
        assert_eq!(classify(&at([0.0, 0.0, 1.5]), &b), SampleClass::InBounds);
    }

    #[test]
    fn test_first_violation_wins() {
        let b = TrackingBounds::default();
        let s = at([-3.0, 2.0, 0.1]);
        assert_eq!(
            classify(&s, &b),
            SampleClass::OutOfBounds(Axis::X, Direction::Below)
        );
        assert_eq!(
            violations(&s, &b),
            AxisViolations::X_BELOW | AxisViolations::Y_ABOVE | AxisViolations::Z_BELOW
        );
    }

    #[test]
    fn test_classify_does_not_touch_sample() {
        let s = at([9.0, 9.0, 9.0]);
        let copy = s;
        let _ = classify(&s, &TrackingBounds::default());
        assert_eq!(s, copy);
    }
}
