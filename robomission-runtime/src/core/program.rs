// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::collections::BTreeSet;

use super::{Actuator, Condition, Directive, Segment, SensorSet, Steering};

#[derive(Clone, Debug, PartialEq)]
pub enum BuildError {
    /// No segments were appended.
    EmptyProgram,
    /// A jump references a label which is never defined.
    UnresolvedLabel(u32),
    /// A label is defined more than once.
    DuplicateLabel(u32),
    /// A numeric parameter is NaN or infinite.
    NonFinite(&'static str),
    /// A distance or time threshold is negative.
    NegativeThreshold(&'static str, f64),
    /// The sensor is not published by the controller.
    UnknownSensor(String),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::EmptyProgram => write!(f, "program has no segments"),
            BuildError::UnresolvedLabel(label) => {
                write!(f, "jump to label {} which is never defined", label)
            }
            BuildError::DuplicateLabel(label) => write!(f, "label {} defined twice", label),
            BuildError::NonFinite(field) => write!(f, "{} is not a finite number", field),
            BuildError::NegativeThreshold(field, value) => {
                write!(f, "{} threshold is negative: {}", field, value)
            }
            BuildError::UnknownSensor(name) => write!(f, "unknown sensor: {}", name),
        }
    }
}

impl std::error::Error for BuildError {}

/// A validated program, ready for upload.
///
/// A program can only be obtained from [`ProgramBuilder::finalize`], every
/// program is therefore non-empty and all jump targets are defined.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    name: String,
    segments: Vec<Segment>,
}

impl Program {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false, a program has at least one segment.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} segments)", self.name, self.segments.len())
    }
}

/// Program builder.
///
/// Segments are validated when they are appended. Jumps may reference
/// labels which are defined later on, unresolved labels are reported
/// by [`ProgramBuilder::finalize`].
pub struct ProgramBuilder<'a> {
    name: String,
    sensors: &'a SensorSet,
    segments: Vec<Segment>,
    labels: BTreeSet<u32>,
}

impl<'a> ProgramBuilder<'a> {
    /// Construct a new program builder.
    pub fn new(name: impl ToString, sensors: &'a SensorSet) -> Self {
        Self {
            name: name.to_string(),
            sensors,
            segments: Vec::new(),
            labels: BTreeSet::new(),
        }
    }

    /// Append a segment to the program.
    pub fn append(&mut self, segment: Segment) -> Result<(), BuildError> {
        if let Directive::Motion(motion) = &segment.directive {
            if let Some(velocity) = motion.velocity {
                finite("vel", velocity)?;
            }
            self.validate_steering(&motion.steering)?;
            if let Some(actuator) = &motion.actuator {
                self.validate_actuator(actuator)?;
            }
            self.validate_condition(&motion.condition)?;
        }

        if let Some(label) = segment.label {
            if !self.labels.insert(label) {
                return Err(BuildError::DuplicateLabel(label));
            }
        }

        self.segments.push(segment);

        Ok(())
    }

    /// Append all segments in order, stopping at the first invalid one.
    pub fn extend<I: IntoIterator<Item = Segment>>(&mut self, segments: I) -> Result<(), BuildError> {
        for segment in segments {
            self.append(segment)?;
        }

        Ok(())
    }

    /// Finalize the program.
    ///
    /// The builder is left untouched, finalizing twice yields the same program.
    pub fn finalize(&self) -> Result<Program, BuildError> {
        if self.segments.is_empty() {
            return Err(BuildError::EmptyProgram);
        }

        if let Some(label) = self
            .segments
            .iter()
            .filter_map(Segment::jump_target)
            .find(|label| !self.labels.contains(label))
        {
            return Err(BuildError::UnresolvedLabel(label));
        }

        Ok(Program {
            name: self.name.clone(),
            segments: self.segments.clone(),
        })
    }

    fn validate_steering(&self, steering: &Steering) -> Result<(), BuildError> {
        match steering {
            Steering::None => Ok(()),
            Steering::TurnRadius(radius) => finite("tr", *radius),
            Steering::EdgeLeft(offset) => finite("edgel", *offset),
            Steering::EdgeRight(offset) => finite("edger", *offset),
        }
    }

    fn validate_actuator(&self, actuator: &Actuator) -> Result<(), BuildError> {
        finite("pservo", actuator.position)?;
        finite("vservo", actuator.rate)
    }

    fn validate_condition(&self, condition: &Condition) -> Result<(), BuildError> {
        match condition {
            Condition::Distance(meters) => non_negative("dist", *meters),
            Condition::Time(seconds) => non_negative("time", *seconds),
            Condition::Turn(degrees) => finite("turn", *degrees),
            Condition::Sensor {
                name, threshold, ..
            } => {
                if !self.sensors.contains(name) {
                    return Err(BuildError::UnknownSensor(name.clone()));
                }
                finite("sensor", *threshold)
            }
            Condition::Count(_) => Ok(()),
        }
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), BuildError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BuildError::NonFinite(field))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), BuildError> {
    finite(field, value)?;
    if value < 0.0 {
        Err(BuildError::NegativeThreshold(field, value))
    } else {
        Ok(())
    }
}
