// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::time::Duration;

use crate::consts::MAX_EVENTS;
use crate::core::{BuildError, Program, ProgramBuilder, Segment, SensorSet};

pub use self::announcer::{Announcement, Announcer, LogAnnouncer};
pub use self::error::MissionError;
pub use self::orchestrator::Orchestrator;

mod announcer;
pub mod course;
mod error;
mod orchestrator;

/// What to do when a completion event does not arrive in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde_derive::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Abort the mission.
    #[default]
    Abort,
    /// Continue with the next stage in degraded mode.
    Continue,
}

/// How the orchestrator decides a stage is complete.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// Proceed as soon as the program is started.
    FireAndForget,
    /// Wait for the controller to raise an event.
    Wait {
        event: u8,
        timeout: Option<Duration>,
        on_timeout: TimeoutPolicy,
    },
}

impl Completion {
    /// Wait for an event without timeout.
    pub fn event(event: u8) -> Self {
        Completion::Wait {
            event,
            timeout: None,
            on_timeout: TimeoutPolicy::Abort,
        }
    }
}

/// A mission stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    /// Stage name.
    pub name: String,
    /// Announcement before the stage starts.
    pub announce: Option<Announcement>,
    /// Program segments.
    pub segments: Vec<Segment>,
    /// Completion condition.
    pub completion: Completion,
}

impl Stage {
    pub fn new(name: impl ToString, segments: Vec<Segment>, completion: Completion) -> Self {
        Self {
            name: name.to_string(),
            announce: None,
            segments,
            completion,
        }
    }

    pub fn with_announcement(mut self, phrase: impl ToString, volume: f32) -> Self {
        self.announce = Some(Announcement::new(phrase, volume));
        self
    }

    /// Check that the completion event is one the controller can raise.
    pub fn check_completion(&self) -> Result<(), MissionError> {
        match self.completion {
            Completion::Wait { event, .. } if usize::from(event) >= MAX_EVENTS => {
                Err(MissionError::InvalidEvent {
                    stage: self.name.clone(),
                    event,
                })
            }
            _ => Ok(()),
        }
    }

    /// Build the stage program.
    pub fn build(&self, sensors: &SensorSet) -> Result<Program, BuildError> {
        let mut builder = ProgramBuilder::new(&self.name, sensors);
        builder.extend(self.segments.iter().cloned())?;
        builder.finalize()
    }
}

/// An ordered list of stages.
#[derive(Clone, Debug, PartialEq)]
pub struct Mission {
    /// Mission name.
    pub name: String,
    /// Stages, run in order.
    pub stages: Vec<Stage>,
    /// Announcement when the mission is complete.
    pub closing: Option<Announcement>,
}

impl Mission {
    /// Check that every stage program builds and every completion event
    /// is in range.
    pub fn validate(&self, sensors: &SensorSet) -> Result<(), MissionError> {
        for stage in &self.stages {
            stage.check_completion()?;
            stage.build(sensors).map_err(|source| MissionError::Build {
                stage: stage.name.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

/// Mission state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    Idle,
    StageBuilding(usize),
    StageUploaded(usize),
    StageRunning(usize),
    StageComplete(usize),
    MissionComplete,
    MissionAborted,
}

impl MissionState {
    /// Check if the mission reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionState::MissionComplete | MissionState::MissionAborted
        )
    }
}

impl std::fmt::Display for MissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionState::Idle => write!(f, "idle"),
            MissionState::StageBuilding(index) => write!(f, "stage {} building", index),
            MissionState::StageUploaded(index) => write!(f, "stage {} uploaded", index),
            MissionState::StageRunning(index) => write!(f, "stage {} running", index),
            MissionState::StageComplete(index) => write!(f, "stage {} complete", index),
            MissionState::MissionComplete => write!(f, "mission complete"),
            MissionState::MissionAborted => write!(f, "mission aborted"),
        }
    }
}

/// How a stage ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The completion event was received.
    Completed,
    /// The program was started without waiting.
    Dispatched,
    /// The completion event timed out, the mission continued.
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub outcome: StageOutcome,
}

/// Summary of a mission run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissionReport {
    pub name: String,
    pub stages: Vec<StageReport>,
}

impl MissionReport {
    fn count(&self, outcome: StageOutcome) -> usize {
        self.stages.iter().filter(|s| s.outcome == outcome).count()
    }

    /// Check if any stage completed in degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.count(StageOutcome::Degraded) > 0
    }
}

impl std::fmt::Display for MissionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mission '{}' finished {} stages: {} completed, {} dispatched, {} degraded",
            self.name,
            self.stages.len(),
            self.count(StageOutcome::Completed),
            self.count(StageOutcome::Dispatched),
            self.count(StageOutcome::Degraded)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Condition, Motion};

    #[test]
    fn test_stage_build() {
        let sensors = SensorSet::default();
        let stage = Stage::new(
            "loop",
            vec![
                Motion::until(Condition::turn(90.0))
                    .velocity(0.1)
                    .turn_radius(0.0)
                    .label(1),
                Segment::jump(1, 2),
            ],
            Completion::event(0),
        );

        let program = stage.build(&sensors).unwrap();

        assert_eq!(program.name(), "loop");
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn test_mission_validate() {
        let sensors = SensorSet::default();
        let mission = Mission {
            name: "broken".to_string(),
            stages: vec![
                Stage::new("empty", vec![], Completion::FireAndForget),
                Stage::new("jump", vec![Segment::jump(4, 1)], Completion::FireAndForget),
            ],
            closing: None,
        };

        match mission.validate(&sensors) {
            Err(MissionError::Build { stage, source }) => {
                assert_eq!(stage, "empty");
                assert_eq!(source, BuildError::EmptyProgram);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_mission_validate_event_range() {
        let sensors = SensorSet::default();
        let segments: Vec<Segment> =
            vec![Motion::until(Condition::distance(1.0)).velocity(0.5).into()];

        let mut mission = Mission {
            name: "range".to_string(),
            stages: vec![Stage::new("last", segments, Completion::event(31))],
            closing: None,
        };

        assert!(mission.validate(&sensors).is_ok());

        mission.stages[0].completion = Completion::event(40);

        match mission.validate(&sensors) {
            Err(MissionError::InvalidEvent { stage, event }) => {
                assert_eq!(stage, "last");
                assert_eq!(event, 40);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_report() {
        let report = MissionReport {
            name: "trial".to_string(),
            stages: vec![
                StageReport {
                    name: "a".to_string(),
                    outcome: StageOutcome::Completed,
                },
                StageReport {
                    name: "b".to_string(),
                    outcome: StageOutcome::Degraded,
                },
            ],
        };

        assert!(report.is_degraded());
        assert_eq!(
            report.to_string(),
            "Mission 'trial' finished 2 stages: 1 completed, 0 dispatched, 1 degraded"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(MissionState::MissionComplete.is_terminal());
        assert!(MissionState::MissionAborted.is_terminal());
        assert!(!MissionState::StageComplete(3).is_terminal());
    }
}
