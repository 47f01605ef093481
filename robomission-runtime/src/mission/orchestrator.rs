// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::SensorSet;
use crate::event::{EventLatch, WaitError};
use crate::protocol::{Channel, ChannelError};

use super::{
    Announcer, Completion, Mission, MissionError, MissionReport, MissionState, Stage, StageOutcome,
    StageReport, TimeoutPolicy,
};

/// Mission orchestrator.
///
/// The orchestrator owns the command channel and runs the mission stages in
/// order. Every stage clears the controller, uploads its program and starts
/// it. Stages with a completion event block until the controller raises it,
/// other stages proceed immediately.
///
/// Any build or channel error aborts the mission. The remaining stages are
/// skipped and the controller is told to stop.
pub struct Orchestrator<T, A> {
    channel: Channel<T>,
    sensors: SensorSet,
    announcer: A,
    state: MissionState,
    history: Vec<MissionState>,
}

impl<T, A> Orchestrator<T, A>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    A: Announcer,
{
    pub fn new(channel: Channel<T>, sensors: SensorSet, announcer: A) -> Self {
        Self {
            channel,
            sensors,
            announcer,
            state: MissionState::Idle,
            history: vec![],
        }
    }

    /// Current mission state.
    #[inline]
    pub fn state(&self) -> MissionState {
        self.state
    }

    /// All states of the last run, in order.
    #[inline]
    pub fn history(&self) -> &[MissionState] {
        &self.history
    }

    /// Event latch of the channel. Aborting the latch aborts the mission.
    #[inline]
    pub fn latch(&self) -> &EventLatch {
        self.channel.latch()
    }

    /// Run the mission to completion.
    pub async fn run(&mut self, mission: &Mission) -> Result<MissionReport, MissionError> {
        self.history.clear();
        self.transition(MissionState::Idle);

        log::info!(
            "Mission '{}' starting with {} stages",
            mission.name,
            mission.stages.len()
        );

        let mut report = MissionReport {
            name: mission.name.clone(),
            stages: Vec::with_capacity(mission.stages.len()),
        };

        for (index, stage) in mission.stages.iter().enumerate() {
            match self.run_stage(index, stage).await {
                Ok(outcome) => report.stages.push(StageReport {
                    name: stage.name.clone(),
                    outcome,
                }),
                Err(e) => {
                    log::error!("Mission '{}' aborted: {}", mission.name, e);
                    self.abort().await;
                    return Err(e);
                }
            }
        }

        self.transition(MissionState::MissionComplete);

        log::info!("Mission '{}' complete", mission.name);

        if let Some(announcement) = &mission.closing {
            self.announcer.say(announcement);
        }

        if let Err(e) = self.channel.mute(true).await {
            log::warn!("Failed to mute controller: {}", e);
        }

        Ok(report)
    }

    async fn run_stage(&mut self, index: usize, stage: &Stage) -> Result<StageOutcome, MissionError> {
        self.ensure_running(stage)?;

        self.transition(MissionState::StageBuilding(index));

        log::info!("Start stage ({}) '{}'", index, stage.name);

        stage.check_completion()?;

        if let Some(announcement) = &stage.announce {
            self.announcer.say(announcement);
        }

        self.ensure_running(stage)?;

        let program = stage
            .build(&self.sensors)
            .map_err(|source| MissionError::Build {
                stage: stage.name.clone(),
                source,
            })?;

        let channel_error = |source: ChannelError| MissionError::Channel {
            stage: stage.name.clone(),
            source,
        };

        self.channel.clear().await.map_err(channel_error)?;
        self.channel.upload(program).await.map_err(channel_error)?;

        self.transition(MissionState::StageUploaded(index));

        // No await between this check and start.
        self.ensure_running(stage)?;

        // Events raised by the previous program must not complete this stage.
        self.channel.latch().clear();
        self.channel.start().await.map_err(channel_error)?;

        self.transition(MissionState::StageRunning(index));

        let outcome = match &stage.completion {
            Completion::FireAndForget => StageOutcome::Dispatched,
            Completion::Wait {
                event,
                timeout,
                on_timeout,
            } => {
                log::debug!("Waiting for event {}", event);

                match self.channel.latch().wait_for(*event, *timeout).await {
                    Ok(()) => StageOutcome::Completed,
                    Err(WaitError::Timeout) if *on_timeout == TimeoutPolicy::Continue => {
                        log::warn!(
                            "Stage '{}' did not report event {} in time, continuing degraded",
                            stage.name,
                            event
                        );
                        StageOutcome::Degraded
                    }
                    Err(source) => {
                        return Err(MissionError::Wait {
                            stage: stage.name.clone(),
                            source,
                        })
                    }
                }
            }
        };

        self.transition(MissionState::StageComplete(index));

        log::info!("Stage ({}) '{}' {:?}", index, stage.name, outcome);

        Ok(outcome)
    }

    fn ensure_running(&self, stage: &Stage) -> Result<(), MissionError> {
        if self.latch().is_aborted() {
            Err(MissionError::Cancelled {
                stage: stage.name.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Leave the controller halted and silent.
    async fn abort(&mut self) {
        self.transition(MissionState::MissionAborted);

        if let Err(e) = self.channel.stop().await {
            log::warn!("Failed to stop controller: {}", e);
        }
        if let Err(e) = self.channel.mute(true).await {
            log::warn!("Failed to mute controller: {}", e);
        }
    }

    fn transition(&mut self, state: MissionState) {
        log::trace!("Mission state {} -> {}", self.state, state);

        self.state = state;
        self.history.push(state);
    }
}
