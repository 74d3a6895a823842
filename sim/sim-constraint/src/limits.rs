//! Distance and angle limits for the limit-style joints.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `[min, max]` range a joint coordinate is allowed to move in.
///
/// Used by [`crate::SlideJoint`] (distance) and
/// [`crate::RotaryLimitJoint`] (relative angle). The joint only pushes back
/// when its coordinate leaves the range.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimits {
    /// Lower bound.
    min: f64,

    /// Upper bound.
    max: f64,
}

impl JointLimits {
    /// Create new limits.
    ///
    /// Reversed bounds are swapped.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max }
    }

    /// Get the lower limit.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Get the upper limit.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Set the lower limit. If it passes the upper limit the two are swapped.
    pub fn set_min(&mut self, min: f64) {
        *self = Self::new(min, self.max);
    }

    /// Set the upper limit. If it passes the lower limit the two are swapped.
    pub fn set_max(&mut self, max: f64) {
        *self = Self::new(self.min, max);
    }

    /// Get the limit state for a value.
    #[must_use]
    pub fn state(&self, value: f64) -> LimitState {
        if value > self.max {
            LimitState::AboveMax(value - self.max)
        } else if value < self.min {
            LimitState::BelowMin(self.min - value)
        } else {
            LimitState::Free
        }
    }
}

/// Where a value sits with respect to a [`JointLimits`] range.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitState {
    /// Inside the range.
    Free,

    /// Below the lower bound, by the contained (positive) amount.
    BelowMin(f64),

    /// Above the upper bound, by the contained (positive) amount.
    AboveMax(f64),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_limits_swapped_order() {
        let limits = JointLimits::new(1.0, -1.0);
        assert_relative_eq!(limits.min(), -1.0);
        assert_relative_eq!(limits.max(), 1.0);
    }

    #[test]
    fn test_set_bounds_keeps_order() {
        let mut limits = JointLimits::new(0.0, 1.0);
        limits.set_min(2.0);
        assert_eq!(limits.min(), 1.0);
        assert_eq!(limits.max(), 2.0);

        limits.set_max(5.0);
        assert_eq!(limits.max(), 5.0);
    }

    #[test]
    fn test_limit_state() {
        let limits = JointLimits::new(-1.0, 1.0);

        assert_eq!(limits.state(0.0), LimitState::Free);
        assert_eq!(limits.state(1.0), LimitState::Free);
        assert_eq!(limits.state(-1.0), LimitState::Free);
        assert!(matches!(limits.state(-1.5), LimitState::BelowMin(d) if (d - 0.5).abs() < 1e-12));
        assert!(matches!(limits.state(1.25), LimitState::AboveMax(d) if (d - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_infinite_bounds_never_engage() {
        let limits = JointLimits::new(f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(limits.state(1e300), LimitState::Free);
        assert_eq!(limits.state(-1e300), LimitState::Free);
    }
}
