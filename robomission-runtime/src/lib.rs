// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

/// The `robomission` library sequences motion programs on a regbot controller.
///
/// A mission is an ordered list of stages. Every stage builds one program
/// from typed segments, uploads it to the controller through the bridge and
/// starts it. The controller runs the program autonomously and reports
/// completion through numbered events, which the host awaits before it moves
/// on to the next stage.
///
/// The `core` module holds the program model and the builder which validates
/// programs before they are sent. The `protocol` module holds the line format
/// and the command channel. The `event` module holds the event latch the
/// channel raises events on. The `mission` module runs the stages.
pub mod core;
pub mod event;
pub mod mission;
pub mod protocol;

mod config;

pub use self::config::*;

/// Robomission runtime module containing various constants.
pub mod consts {
    /// Robomission runtime version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Default bridge network port.
    pub const DEFAULT_BRIDGE_PORT: u16 = 24_001;

    /// Default bridge network address.
    pub const DEFAULT_BRIDGE_ADDRESS: &str = "127.0.0.1:24001";

    /// Default device the bridge forwards instructions to.
    pub const DEFAULT_TARGET: &str = "regbot";

    /// Number of event indices the controller can raise.
    pub const MAX_EVENTS: usize = 32;

    /// Default announcement volume.
    pub const DEFAULT_VOLUME: f32 = 1.0;
}

/// Read configuration from a TOML file.
pub fn from_file<T: serde::de::DeserializeOwned>(
    path: impl AsRef<std::path::Path>,
) -> std::io::Result<T> {
    let contents = std::fs::read_to_string(path)?;

    toml::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
