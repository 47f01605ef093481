// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

/// Steering mode of a motion segment.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Steering {
    /// No steering directive.
    #[default]
    None,
    /// Fixed turn radius in meters. A radius of zero turns on the spot.
    TurnRadius(f64),
    /// Follow the left edge of the line at the given offset.
    EdgeLeft(f64),
    /// Follow the right edge of the line at the given offset.
    EdgeRight(f64),
}

impl Steering {
    /// Numeric parameter of the steering mode, if any.
    pub fn parameter(&self) -> Option<f64> {
        match self {
            Steering::None => None,
            Steering::TurnRadius(value) | Steering::EdgeLeft(value) | Steering::EdgeRight(value) => {
                Some(*value)
            }
        }
    }
}

/// Auxiliary device target, for example the gripper arm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Actuator {
    /// Device identifier on the controller.
    pub id: u8,
    /// Target position.
    pub position: f64,
    /// Rate of change towards the target position.
    pub rate: f64,
}

impl Actuator {
    pub fn new(id: u8, position: f64, rate: f64) -> Self {
        Self { id, position, rate }
    }
}

/// Comparison operator of a sensor condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Sensor value drops below the threshold.
    Less,
    /// Sensor value exceeds the threshold.
    Greater,
}

impl Comparison {
    pub fn symbol(&self) -> char {
        match self {
            Comparison::Less => '<',
            Comparison::Greater => '>',
        }
    }
}

impl TryFrom<char> for Comparison {
    type Error = ();

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '<' => Ok(Comparison::Less),
            '>' => Ok(Comparison::Greater),
            _ => Err(()),
        }
    }
}

/// Segment termination condition.
///
/// The controller advances to the next segment as soon as the condition
/// holds. Distance and turn are measured from the start of the segment.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Distance traveled in meters.
    Distance(f64),
    /// Elapsed time in seconds.
    Time(f64),
    /// Cumulative turn angle in degrees, signed.
    Turn(f64),
    /// Named sensor value compared against a threshold.
    Sensor {
        name: String,
        op: Comparison,
        threshold: f64,
    },
    /// Iteration counter.
    Count(u32),
}

impl Condition {
    pub fn distance(meters: f64) -> Self {
        Condition::Distance(meters)
    }

    pub fn time(seconds: f64) -> Self {
        Condition::Time(seconds)
    }

    pub fn turn(degrees: f64) -> Self {
        Condition::Turn(degrees)
    }

    /// Sensor value is below the threshold.
    pub fn below(name: impl ToString, threshold: f64) -> Self {
        Condition::Sensor {
            name: name.to_string(),
            op: Comparison::Less,
            threshold,
        }
    }

    /// Sensor value is above the threshold.
    pub fn above(name: impl ToString, threshold: f64) -> Self {
        Condition::Sensor {
            name: name.to_string(),
            op: Comparison::Greater,
            threshold,
        }
    }
}

/// A motion directive, ended by its termination condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Motion {
    /// Velocity in m/s. When absent the controller keeps the current velocity.
    pub velocity: Option<f64>,
    /// Steering mode.
    pub steering: Steering,
    /// Optional actuator target.
    pub actuator: Option<Actuator>,
    /// Termination condition.
    pub condition: Condition,
}

impl Motion {
    /// Construct a motion which runs until the condition holds.
    pub fn until(condition: Condition) -> Self {
        Self {
            velocity: None,
            steering: Steering::None,
            actuator: None,
            condition,
        }
    }

    pub fn velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn turn_radius(mut self, radius: f64) -> Self {
        self.steering = Steering::TurnRadius(radius);
        self
    }

    pub fn edge_left(mut self, offset: f64) -> Self {
        self.steering = Steering::EdgeLeft(offset);
        self
    }

    pub fn edge_right(mut self, offset: f64) -> Self {
        self.steering = Steering::EdgeRight(offset);
        self
    }

    pub fn servo(mut self, id: u8, position: f64, rate: f64) -> Self {
        self.actuator = Some(Actuator::new(id, position, rate));
        self
    }

    /// Attach a label to this motion.
    pub fn label(self, label: u32) -> Segment {
        Segment::from(self).with_label(label)
    }
}

/// What a segment does when the controller reaches it.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// Drive until the termination condition holds.
    Motion(Motion),
    /// Jump back to `label`, `count` times.
    Jump { label: u32, count: u32 },
}

/// One line of a program.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Optional label, target of a jump.
    pub label: Option<u32>,
    pub directive: Directive,
}

impl Segment {
    /// Construct a jump to `label`, repeated `count` times.
    pub fn jump(label: u32, count: u32) -> Self {
        Self {
            label: None,
            directive: Directive::Jump { label, count },
        }
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }

    /// Check if the segment is a control flow jump.
    #[inline]
    pub fn is_jump(&self) -> bool {
        matches!(self.directive, Directive::Jump { .. })
    }

    /// The jump target, if this is a jump.
    pub fn jump_target(&self) -> Option<u32> {
        match self.directive {
            Directive::Jump { label, .. } => Some(label),
            Directive::Motion(_) => None,
        }
    }

    /// Termination condition of the segment.
    ///
    /// The termination of a jump is its iteration counter.
    pub fn condition(&self) -> Condition {
        match &self.directive {
            Directive::Motion(motion) => motion.condition.clone(),
            Directive::Jump { count, .. } => Condition::Count(*count),
        }
    }
}

impl From<Motion> for Segment {
    fn from(motion: Motion) -> Self {
        Self {
            label: None,
            directive: Directive::Motion(motion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison() {
        assert_eq!(Comparison::try_from('<').unwrap(), Comparison::Less);
        assert_eq!(Comparison::try_from('>').unwrap(), Comparison::Greater);
        assert!(Comparison::try_from('=').is_err());
        assert_eq!(Comparison::Less.symbol(), '<');
    }

    #[test]
    fn test_motion_builder() {
        let segment: Segment = Motion::until(Condition::distance(2.5))
            .velocity(0.5)
            .edge_right(0.0)
            .into();

        assert!(!segment.is_jump());
        assert_eq!(segment.label, None);
        assert_eq!(segment.condition(), Condition::Distance(2.5));

        match segment.directive {
            Directive::Motion(motion) => {
                assert_eq!(motion.velocity, Some(0.5));
                assert_eq!(motion.steering, Steering::EdgeRight(0.0));
                assert_eq!(motion.actuator, None);
            }
            Directive::Jump { .. } => panic!("expected motion"),
        }
    }

    #[test]
    fn test_jump() {
        let segment = Segment::jump(1, 2);

        assert!(segment.is_jump());
        assert_eq!(segment.jump_target(), Some(1));
        assert_eq!(segment.condition(), Condition::Count(2));
    }

    #[test]
    fn test_label() {
        let segment = Motion::until(Condition::turn(-50.0))
            .velocity(0.05)
            .turn_radius(0.0)
            .label(1);

        assert_eq!(segment.label, Some(1));
        assert_eq!(segment.jump_target(), None);
    }

    #[test]
    fn test_steering_parameter() {
        assert_eq!(Steering::None.parameter(), None);
        assert_eq!(Steering::TurnRadius(0.25).parameter(), Some(0.25));
        assert_eq!(Steering::EdgeLeft(-1.0).parameter(), Some(-1.0));
    }
}
