//! The closed set of joint types as one sum type.

use sim_types::{Body, BodyId};

use crate::constraint::{Constraint, ConstraintParams};
use crate::gear::GearJoint;
use crate::groove::GrooveJoint;
use crate::motor::SimpleMotor;
use crate::pin::PinJoint;
use crate::pivot::PivotJoint;
use crate::ratchet::RatchetJoint;
use crate::rotary_limit::RotaryLimitJoint;
use crate::slide::SlideJoint;
use crate::spring::{DampedRotarySpring, DampedSpring};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type tag for a [`Joint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// Fixed anchor distance.
    Pin,
    /// Anchor distance inside a range.
    Slide,
    /// Coincident anchors.
    Pivot,
    /// Anchor sliding along a segment.
    Groove,
    /// Angular ratio lock.
    Gear,
    /// Constant relative spin.
    SimpleMotor,
    /// One-way angular catch.
    Ratchet,
    /// Relative angle inside a range.
    RotaryLimit,
    /// Linear spring-damper.
    DampedSpring,
    /// Torsional spring-damper.
    DampedRotarySpring,
}

impl JointType {
    /// Whether this type constrains only the relative angle.
    #[must_use]
    pub fn is_angular(&self) -> bool {
        matches!(
            self,
            Self::Gear
                | Self::SimpleMotor
                | Self::Ratchet
                | Self::RotaryLimit
                | Self::DampedRotarySpring
        )
    }

    /// Whether the accumulated impulse is a 2-vector.
    #[must_use]
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Pivot | Self::Groove)
    }
}

/// Any joint, spring or motor.
///
/// Dispatches the [`Constraint`] operations to the wrapped type.
///
/// # Example
///
/// ```
/// use sim_constraint::{Constraint, Joint, JointType, SimpleMotor};
/// use sim_types::BodyId;
///
/// let joint: Joint = SimpleMotor::new(BodyId::new(0), BodyId::new(1), 1.0).into();
/// assert_eq!(joint.joint_type(), JointType::SimpleMotor);
/// assert_eq!(joint.bodies(), (BodyId::new(0), BodyId::new(1)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Joint {
    /// See [`PinJoint`].
    Pin(PinJoint),
    /// See [`SlideJoint`].
    Slide(SlideJoint),
    /// See [`PivotJoint`].
    Pivot(PivotJoint),
    /// See [`GrooveJoint`].
    Groove(GrooveJoint),
    /// See [`GearJoint`].
    Gear(GearJoint),
    /// See [`SimpleMotor`].
    SimpleMotor(SimpleMotor),
    /// See [`RatchetJoint`].
    Ratchet(RatchetJoint),
    /// See [`RotaryLimitJoint`].
    RotaryLimit(RotaryLimitJoint),
    /// See [`DampedSpring`].
    DampedSpring(DampedSpring),
    /// See [`DampedRotarySpring`].
    DampedRotarySpring(DampedRotarySpring),
}

impl Joint {
    /// Get the type tag.
    #[must_use]
    pub fn joint_type(&self) -> JointType {
        match self {
            Self::Pin(_) => JointType::Pin,
            Self::Slide(_) => JointType::Slide,
            Self::Pivot(_) => JointType::Pivot,
            Self::Groove(_) => JointType::Groove,
            Self::Gear(_) => JointType::Gear,
            Self::SimpleMotor(_) => JointType::SimpleMotor,
            Self::Ratchet(_) => JointType::Ratchet,
            Self::RotaryLimit(_) => JointType::RotaryLimit,
            Self::DampedSpring(_) => JointType::DampedSpring,
            Self::DampedRotarySpring(_) => JointType::DampedRotarySpring,
        }
    }

    fn as_constraint(&self) -> &dyn Constraint {
        match self {
            Self::Pin(j) => j,
            Self::Slide(j) => j,
            Self::Pivot(j) => j,
            Self::Groove(j) => j,
            Self::Gear(j) => j,
            Self::SimpleMotor(j) => j,
            Self::Ratchet(j) => j,
            Self::RotaryLimit(j) => j,
            Self::DampedSpring(j) => j,
            Self::DampedRotarySpring(j) => j,
        }
    }

    fn as_constraint_mut(&mut self) -> &mut dyn Constraint {
        match self {
            Self::Pin(j) => j,
            Self::Slide(j) => j,
            Self::Pivot(j) => j,
            Self::Groove(j) => j,
            Self::Gear(j) => j,
            Self::SimpleMotor(j) => j,
            Self::Ratchet(j) => j,
            Self::RotaryLimit(j) => j,
            Self::DampedSpring(j) => j,
            Self::DampedRotarySpring(j) => j,
        }
    }
}

impl Constraint for Joint {
    fn bodies(&self) -> (BodyId, BodyId) {
        self.as_constraint().bodies()
    }

    fn params(&self) -> &ConstraintParams {
        self.as_constraint().params()
    }

    fn params_mut(&mut self) -> &mut ConstraintParams {
        self.as_constraint_mut().params_mut()
    }

    fn pre_step(&mut self, a: &Body, b: &Body, dt: f64) {
        self.as_constraint_mut().pre_step(a, b, dt);
    }

    fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        self.as_constraint_mut().apply_cached_impulse(a, b, dt_coef);
    }

    fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        self.as_constraint_mut().apply_impulse(a, b);
    }

    fn impulse(&self) -> f64 {
        self.as_constraint().impulse()
    }
}

macro_rules! impl_from_joint {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Joint {
                fn from(joint: $ty) -> Self {
                    Self::$variant(joint)
                }
            }
        )*
    };
}

impl_from_joint! {
    PinJoint => Pin,
    SlideJoint => Slide,
    PivotJoint => Pivot,
    GrooveJoint => Groove,
    GearJoint => Gear,
    SimpleMotor => SimpleMotor,
    RatchetJoint => Ratchet,
    RotaryLimitJoint => RotaryLimit,
    DampedSpring => DampedSpring,
    DampedRotarySpring => DampedRotarySpring,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Vector2};

    fn ids() -> (BodyId, BodyId) {
        (BodyId::new(0), BodyId::new(1))
    }

    #[test]
    fn test_type_tags() {
        let (a, b) = ids();
        let joints: Vec<Joint> = vec![
            SlideJoint::new(a, b, Vector2::zeros(), Vector2::zeros(), 0.0, 1.0).into(),
            PivotJoint::new(a, b, Vector2::zeros(), Vector2::zeros()).into(),
            GrooveJoint::new(a, b, Point2::origin(), Point2::new(1.0, 0.0), Vector2::zeros())
                .into(),
            GearJoint::new(a, b, 0.0, 1.0).into(),
            SimpleMotor::new(a, b, 1.0).into(),
            RotaryLimitJoint::new(a, b, -1.0, 1.0).into(),
            DampedSpring::new(a, b, Vector2::zeros(), Vector2::zeros(), 1.0, 1.0, 1.0).into(),
            DampedRotarySpring::new(a, b, 0.0, 1.0, 1.0).into(),
        ];

        let tags: Vec<_> = joints.iter().map(Joint::joint_type).collect();
        assert_eq!(
            tags,
            vec![
                JointType::Slide,
                JointType::Pivot,
                JointType::Groove,
                JointType::Gear,
                JointType::SimpleMotor,
                JointType::RotaryLimit,
                JointType::DampedSpring,
                JointType::DampedRotarySpring,
            ]
        );
        assert!(joints.iter().all(|j| j.bodies() == (a, b)));
    }

    #[test]
    fn test_type_properties() {
        assert!(JointType::Gear.is_angular());
        assert!(!JointType::Pin.is_angular());
        assert!(JointType::Groove.is_vector());
        assert!(!JointType::Ratchet.is_vector());
    }

    #[test]
    fn test_params_dispatch() {
        let (a, b) = ids();
        let mut joint: Joint = SimpleMotor::new(a, b, 1.0).into();
        joint.params_mut().set_max_force(4.0);
        assert_eq!(joint.params().max_force(), 4.0);

        let mut body_a = Body::new(1.0, 1.0);
        let mut body_b = Body::new_static();
        joint.pre_step(&body_a, &body_b, 0.5);
        joint.apply_impulse(&mut body_a, &mut body_b);
        assert_eq!(joint.impulse(), 1.0);
    }
}
