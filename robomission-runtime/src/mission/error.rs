// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::{error, fmt};

use crate::core::BuildError;
use crate::event::WaitError;
use crate::protocol::ChannelError;

#[derive(Debug)]
pub enum MissionError {
    /// Stage program is invalid.
    Build { stage: String, source: BuildError },
    /// Controller communication failed.
    Channel { stage: String, source: ChannelError },
    /// Completion event did not arrive.
    Wait { stage: String, source: WaitError },
    /// Completion event is outside of the controller range.
    InvalidEvent { stage: String, event: u8 },
    /// Mission aborted before the stage program was started.
    Cancelled { stage: String },
}

impl MissionError {
    /// Name of the failed stage.
    pub fn stage(&self) -> &str {
        match self {
            MissionError::Build { stage, .. }
            | MissionError::Channel { stage, .. }
            | MissionError::Wait { stage, .. }
            | MissionError::InvalidEvent { stage, .. }
            | MissionError::Cancelled { stage } => stage,
        }
    }
}

impl fmt::Display for MissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionError::Build { stage, source } => {
                write!(f, "stage '{}' program invalid: {}", stage, source)
            }
            MissionError::Channel { stage, source } => write!(f, "stage '{}': {}", stage, source),
            MissionError::Wait { stage, source } => write!(f, "stage '{}': {}", stage, source),
            MissionError::InvalidEvent { stage, event } => write!(
                f,
                "stage '{}' waits on event {} out of range (0..{})",
                stage,
                event,
                crate::consts::MAX_EVENTS
            ),
            MissionError::Cancelled { stage } => {
                write!(f, "mission cancelled before stage '{}' started", stage)
            }
        }
    }
}

impl error::Error for MissionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            MissionError::Build { source, .. } => Some(source),
            MissionError::Channel { source, .. } => Some(source),
            MissionError::Wait { source, .. } => Some(source),
            MissionError::InvalidEvent { .. } | MissionError::Cancelled { .. } => None,
        }
    }
}
