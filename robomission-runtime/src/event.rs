// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::consts::MAX_EVENTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitError {
    /// The event did not arrive in time.
    Timeout,
    /// The mission was aborted.
    Cancelled,
    /// The controller connection is gone, the event can no longer arrive.
    Disconnected,
    /// Event index outside of the controller range.
    InvalidIndex(u8),
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::Timeout => write!(f, "timeout waiting for event"),
            WaitError::Cancelled => write!(f, "wait cancelled"),
            WaitError::Disconnected => write!(f, "controller disconnected"),
            WaitError::InvalidIndex(index) => {
                write!(f, "event index {} out of range (0..{})", index, MAX_EVENTS)
            }
        }
    }
}

impl std::error::Error for WaitError {}

#[derive(Clone, Copy, Debug, Default)]
struct LatchState {
    /// One bit per event index.
    flags: u32,
    aborted: bool,
    disconnected: bool,
}

/// Event latch.
///
/// Every event index is a level-triggered flag. The inbound reader raises a
/// flag when the controller reports the event, a waiter consumes it. Raising
/// a flag which is already set has no effect. A raised flag stays set until
/// it is consumed or cleared, whether or not someone is waiting.
///
/// The latch is cheap to clone, all clones share the same state.
#[derive(Clone)]
pub struct EventLatch {
    state: Arc<watch::Sender<LatchState>>,
}

impl EventLatch {
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(LatchState::default())),
        }
    }

    /// Reset every event index to unset.
    pub fn clear(&self) {
        self.state.send_modify(|state| state.flags = 0);
    }

    /// Check if an event is currently raised without consuming it.
    pub fn is_set(&self, index: u8) -> bool {
        mask(index).is_some_and(|mask| self.state.borrow().flags & mask != 0)
    }

    /// Abort the latch.
    ///
    /// Any pending and future wait returns [`WaitError::Cancelled`].
    pub fn abort(&self) {
        self.state.send_modify(|state| state.aborted = true);
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state.borrow().aborted
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.state.borrow().disconnected
    }

    /// Raise an event.
    pub(crate) fn raise(&self, index: u8) {
        match mask(index) {
            Some(mask) => {
                self.state.send_if_modified(|state| {
                    let modified = state.flags & mask == 0;
                    state.flags |= mask;
                    modified
                });
            }
            None => log::warn!("Ignoring event with index {} out of range", index),
        }
    }

    /// Mark the event source as gone.
    pub(crate) fn disconnect(&self) {
        self.state.send_modify(|state| state.disconnected = true);
    }

    /// Wait for an event and consume it.
    ///
    /// Without timeout the wait lasts until the event is raised, the latch
    /// is aborted or the controller disconnects. On timeout nothing is
    /// consumed.
    pub async fn wait_for(&self, index: u8, timeout: Option<Duration>) -> Result<(), WaitError> {
        let mask = mask(index).ok_or(WaitError::InvalidIndex(index))?;

        self.wait_with_timeout(timeout, |flags| {
            if flags & mask != 0 {
                Some((mask, index))
            } else {
                None
            }
        })
        .await
        .map(|_| ())
    }

    /// Wait for any event and consume it.
    ///
    /// If several events are raised the lowest index is returned first.
    pub async fn wait_any(&self, timeout: Option<Duration>) -> Result<u8, WaitError> {
        self.wait_with_timeout(timeout, |flags| {
            if flags != 0 {
                let index = flags.trailing_zeros() as u8;
                Some((1 << index, index))
            } else {
                None
            }
        })
        .await
    }

    async fn wait_with_timeout<F>(&self, timeout: Option<Duration>, select: F) -> Result<u8, WaitError>
    where
        F: Fn(u32) -> Option<(u32, u8)>,
    {
        match timeout {
            Some(duration) => tokio::time::timeout(duration, self.wait(select))
                .await
                .map_err(|_| WaitError::Timeout)?,
            None => self.wait(select).await,
        }
    }

    async fn wait<F>(&self, select: F) -> Result<u8, WaitError>
    where
        F: Fn(u32) -> Option<(u32, u8)>,
    {
        // Subscribe before the first check so no raise can slip through.
        let mut receiver = self.state.subscribe();

        loop {
            let mut outcome = None;

            self.state.send_if_modified(|state| {
                if state.aborted {
                    outcome = Some(Err(WaitError::Cancelled));
                    false
                } else if let Some((mask, index)) = select(state.flags) {
                    state.flags &= !mask;
                    outcome = Some(Ok(index));
                    true
                } else if state.disconnected {
                    outcome = Some(Err(WaitError::Disconnected));
                    false
                } else {
                    false
                }
            });

            if let Some(outcome) = outcome {
                return outcome;
            }

            // The sender lives in self, the channel cannot close.
            if receiver.changed().await.is_err() {
                return Err(WaitError::Disconnected);
            }
        }
    }
}

impl Default for EventLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.borrow();

        f.debug_struct("EventLatch")
            .field("flags", &format_args!("{:#034b}", state.flags))
            .field("aborted", &state.aborted)
            .field("disconnected", &state.disconnected)
            .finish()
    }
}

fn mask(index: u8) -> Option<u32> {
    if (index as usize) < MAX_EVENTS {
        Some(1 << index)
    } else {
        None
    }
}
