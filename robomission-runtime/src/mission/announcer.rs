// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

/// Phrase spoken to the audience.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub phrase: String,
    /// Volume between 0 and 1.
    pub volume: f32,
}

impl Announcement {
    pub fn new(phrase: impl ToString, volume: f32) -> Self {
        Self {
            phrase: phrase.to_string(),
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

/// Audio sink for announcements.
///
/// Announcements never affect the mission, an announcer must not fail.
pub trait Announcer {
    fn say(&mut self, announcement: &Announcement);
}

/// Announcer which writes the phrase to the log.
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn say(&mut self, announcement: &Announcement) {
        log::info!(
            "Announce: {} (volume {:.0}%)",
            announcement.phrase,
            announcement.volume * 100.0
        );
    }
}
