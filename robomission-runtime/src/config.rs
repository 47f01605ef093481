// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::time::Duration;

use crate::core::SensorSet;
use crate::mission::{Announcement, Completion, Mission, Stage, TimeoutPolicy};
use crate::protocol::{parse_listing, ListingError};

pub trait Configurable: Clone {
    fn global(&self) -> &GlobalConfig;
}

/// Robomission global configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Name of the binary.
    pub bin_name: String,

    /// Whether the application runs as daemon.
    pub daemon: bool,
}

impl Configurable for GlobalConfig {
    fn global(&self) -> &GlobalConfig {
        self
    }
}

#[derive(Clone, Debug, serde_derive::Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Bridge network address.
    #[serde(default = "BridgeConfig::default_address")]
    pub address: String,
    /// Device the bridge forwards instructions to.
    #[serde(default = "BridgeConfig::default_target")]
    pub target: String,
}

impl BridgeConfig {
    fn default_address() -> String {
        crate::consts::DEFAULT_BRIDGE_ADDRESS.to_string()
    }

    fn default_target() -> String {
        crate::consts::DEFAULT_TARGET.to_string()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            target: Self::default_target(),
        }
    }
}

#[derive(Clone, Debug, Default, serde_derive::Deserialize, PartialEq, Eq)]
pub struct SensorConfig {
    /// Sensors published by the controller in addition to the regbot set.
    #[serde(default)]
    pub extra: Vec<String>,
}

impl SensorConfig {
    pub fn sensor_set(&self) -> SensorSet {
        let mut sensors = SensorSet::regbot();
        sensors.extend(&self.extra);
        sensors
    }
}

#[derive(Clone, Debug, serde_derive::Deserialize, PartialEq)]
pub struct WaitConfig {
    /// Event index which marks the stage complete.
    pub event: u8,
    /// Timeout in seconds, wait forever if absent.
    pub timeout: Option<f64>,
    /// What to do when the event does not arrive in time.
    #[serde(default)]
    pub on_timeout: TimeoutPolicy,
}

#[derive(Clone, Debug, serde_derive::Deserialize, PartialEq)]
pub struct StageConfig {
    /// Stage name.
    pub name: String,
    /// Phrase announced before the stage starts.
    pub announce: Option<String>,
    /// Announcement volume.
    #[serde(default = "StageConfig::default_volume")]
    pub volume: f32,
    /// Program listing, one segment per line.
    pub program: Vec<String>,
    /// Completion event, the stage is fire-and-forget if absent.
    pub wait: Option<WaitConfig>,
}

impl StageConfig {
    fn default_volume() -> f32 {
        crate::consts::DEFAULT_VOLUME
    }
}

#[derive(Clone, Debug, Default, serde_derive::Deserialize, PartialEq)]
pub struct MissionConfig {
    /// Mission name.
    pub name: Option<String>,
    /// Bridge configuration.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Sensor configuration.
    #[serde(default)]
    pub sensors: SensorConfig,
    /// Phrase announced when the mission is complete.
    pub closing: Option<String>,
    /// Mission stages, in order.
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageConfig>,
    /// Global configuration.
    #[serde(skip)]
    pub global: GlobalConfig,
}

impl Configurable for MissionConfig {
    fn global(&self) -> &GlobalConfig {
        &self.global
    }
}

impl std::fmt::Display for MissionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mission {} with {} stages on {}@{}",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.stages.len(),
            self.bridge.target,
            self.bridge.address
        )
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// The mission has no stages.
    NoStages,
    /// Stage program listing could not be parsed.
    Program { stage: String, error: ListingError },
    /// Stage timeout is negative or not a number.
    Timeout { stage: String, value: f64 },
    /// Stage completion event is outside of the controller range.
    Event { stage: String, event: u8 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoStages => write!(f, "mission has no stages"),
            ConfigError::Program { stage, error } => {
                write!(f, "stage '{}' program, {}", stage, error)
            }
            ConfigError::Timeout { stage, value } => {
                write!(f, "stage '{}' has invalid timeout: {}", stage, value)
            }
            ConfigError::Event { stage, event } => write!(
                f,
                "stage '{}' waits on event {} out of range (0..{})",
                stage,
                event,
                crate::consts::MAX_EVENTS
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Program { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl TryFrom<&StageConfig> for Stage {
    type Error = ConfigError;

    fn try_from(config: &StageConfig) -> Result<Self, Self::Error> {
        let segments =
            parse_listing(&config.program.join("\n")).map_err(|error| ConfigError::Program {
                stage: config.name.clone(),
                error,
            })?;

        let completion = match &config.wait {
            None => Completion::FireAndForget,
            Some(wait) if usize::from(wait.event) >= crate::consts::MAX_EVENTS => {
                return Err(ConfigError::Event {
                    stage: config.name.clone(),
                    event: wait.event,
                })
            }
            Some(wait) => Completion::Wait {
                event: wait.event,
                timeout: wait
                    .timeout
                    .map(|value| {
                        Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Timeout {
                            stage: config.name.clone(),
                            value,
                        })
                    })
                    .transpose()?,
                on_timeout: wait.on_timeout,
            },
        };

        Ok(Stage {
            name: config.name.clone(),
            announce: config
                .announce
                .as_ref()
                .map(|phrase| Announcement::new(phrase, config.volume)),
            segments,
            completion,
        })
    }
}

impl TryFrom<&MissionConfig> for Mission {
    type Error = ConfigError;

    fn try_from(config: &MissionConfig) -> Result<Self, Self::Error> {
        if config.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        Ok(Mission {
            name: config.name.clone().unwrap_or_else(|| "mission".to_string()),
            stages: config
                .stages
                .iter()
                .map(Stage::try_from)
                .collect::<Result<_, _>>()?,
            closing: config
                .closing
                .as_ref()
                .map(|phrase| Announcement::new(phrase, crate::consts::DEFAULT_VOLUME)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Condition, Segment};
    use crate::protocol::ParseError;

    const MISSION: &str = r#"
        name = "trial"
        closing = "Done"

        [bridge]
        address = "10.0.0.2:24001"

        [sensors]
        extra = ["head"]

        [[stage]]
        name = "guillotine"
        announce = "Here we go"
        volume = 0.75
        program = [
            "vel=0.5, edger=0:dist=2.5",
            "vel=0:time=1",
        ]
        wait = { event = 0, timeout = 30.0 }

        [[stage]]
        name = "loop"
        program = [
            "label=1, vel=0.1, tr=0:turn=90",
            "vel=0.1:head>1.5",
            "goto=1:count=2",
        ]
        wait = { event = 1, timeout = 0.5, on_timeout = "continue" }

        [[stage]]
        name = "goal"
        program = ["vel=0.5, edger=0:ir2<0.2"]
    "#;

    #[test]
    fn test_mission_config() {
        let config: MissionConfig = toml::from_str(MISSION).unwrap();

        assert_eq!(config.name.as_deref(), Some("trial"));
        assert_eq!(config.bridge.address, "10.0.0.2:24001");
        assert_eq!(config.bridge.target, "regbot");
        assert!(config.sensors.sensor_set().contains("head"));
        assert!(config.sensors.sensor_set().contains("lv"));
        assert_eq!(config.stages.len(), 3);
        assert_eq!(config.stages[1].volume, crate::consts::DEFAULT_VOLUME);
        assert_eq!(config.global(), &GlobalConfig::default());

        let mission = Mission::try_from(&config).unwrap();

        assert_eq!(mission.name, "trial");
        assert_eq!(mission.stages[0].segments.len(), 2);
        assert_eq!(
            mission.stages[0].announce,
            Some(Announcement::new("Here we go", 0.75))
        );
        assert_eq!(
            mission.stages[0].completion,
            Completion::Wait {
                event: 0,
                timeout: Some(Duration::from_secs(30)),
                on_timeout: TimeoutPolicy::Abort,
            }
        );
        assert_eq!(
            mission.stages[1].completion,
            Completion::Wait {
                event: 1,
                timeout: Some(Duration::from_millis(500)),
                on_timeout: TimeoutPolicy::Continue,
            }
        );
        assert_eq!(mission.stages[1].segments[2], Segment::jump(1, 2));
        assert_eq!(mission.stages[2].completion, Completion::FireAndForget);
        assert_eq!(
            mission.stages[2].segments[0].condition(),
            Condition::below("ir2", 0.2)
        );

        assert!(mission.validate(&config.sensors.sensor_set()).is_ok());
    }

    #[test]
    fn test_default_config() {
        let config: MissionConfig = toml::from_str("").unwrap();

        assert_eq!(config.bridge, BridgeConfig::default());
        assert_eq!(config.bridge.address, "127.0.0.1:24001");
        assert!(config.stages.is_empty());
        assert!(matches!(
            Mission::try_from(&config),
            Err(ConfigError::NoStages)
        ));
    }

    #[test]
    fn test_invalid_program_line() {
        let config: MissionConfig = toml::from_str(
            r#"
            [[stage]]
            name = "broken"
            program = ["vel=0.1:dist=1", "vel=0.1, edger=0"]
            "#,
        )
        .unwrap();

        match Mission::try_from(&config) {
            Err(ConfigError::Program { stage, error }) => {
                assert_eq!(stage, "broken");
                assert_eq!(error.line, 2);
                assert_eq!(error.error, ParseError::MissingCondition);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_timeout() {
        let config: MissionConfig = toml::from_str(
            r#"
            [[stage]]
            name = "negative"
            program = ["vel=0.1:dist=1"]
            wait = { event = 0, timeout = -1.0 }
            "#,
        )
        .unwrap();

        assert!(matches!(
            Mission::try_from(&config),
            Err(ConfigError::Timeout { .. })
        ));
    }

    #[test]
    fn test_event_out_of_range() {
        let config: MissionConfig = toml::from_str(
            r#"
            [[stage]]
            name = "beyond"
            program = ["vel=0.1:dist=1"]
            wait = { event = 32 }
            "#,
        )
        .unwrap();

        match Mission::try_from(&config) {
            Err(ConfigError::Event { stage, event }) => {
                assert_eq!(stage, "beyond");
                assert_eq!(event, 32);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
