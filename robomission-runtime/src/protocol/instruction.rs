// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::core::{Actuator, Comparison, Condition, Directive, Motion, Segment, Steering};

/// Keys accepted in the parameter part of a segment.
const MOTION_KEYS: [&str; 9] = [
    "label", "vel", "tr", "edgel", "edger", "servo", "pservo", "vservo", "goto",
];

#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    /// Nothing to parse.
    Empty,
    /// Unknown control keyword.
    UnknownKeyword(String),
    /// Unknown parameter or condition key.
    UnknownKey(String),
    /// Text does not follow the line format.
    Malformed(String),
    /// Value could not be parsed as a number.
    InvalidNumber { key: String, value: String },
    /// Parameter appears twice.
    DuplicateKey(String),
    /// Parameters which exclude each other.
    ConflictingKeys(String, String),
    /// A required parameter is absent.
    MissingKey(&'static str),
    /// A segment without termination clause.
    MissingCondition,
    /// More than one termination clause.
    MultipleConditions,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty instruction"),
            ParseError::UnknownKeyword(keyword) => write!(f, "unknown keyword: {}", keyword),
            ParseError::UnknownKey(key) => write!(f, "unknown key: {}", key),
            ParseError::Malformed(text) => write!(f, "malformed instruction: {}", text),
            ParseError::InvalidNumber { key, value } => {
                write!(f, "invalid number for {}: {}", key, value)
            }
            ParseError::DuplicateKey(key) => write!(f, "duplicate key: {}", key),
            ParseError::ConflictingKeys(a, b) => write!(f, "conflicting keys: {} and {}", a, b),
            ParseError::MissingKey(key) => write!(f, "missing key: {}", key),
            ParseError::MissingCondition => write!(f, "missing termination condition"),
            ParseError::MultipleConditions => write!(f, "more than one termination condition"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Instruction sent to the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Discard the stored program.
    Clear,
    /// Append one segment to the stored program.
    Add(Segment),
    /// Execute the stored program from its first segment.
    Start,
    /// Halt motion.
    Stop,
    /// Suppress controller messages.
    Mute(bool),
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Clear => write!(f, "mclear"),
            Instruction::Add(segment) => write!(f, "madd {}", segment),
            Instruction::Start => write!(f, "start"),
            Instruction::Stop => write!(f, "stop"),
            Instruction::Mute(mute) => write!(f, "mute {}", if *mute { 1 } else { 0 }),
        }
    }
}

impl FromStr for Instruction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (keyword, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let rest = rest.trim();

        match keyword {
            "" => Err(ParseError::Empty),
            "mclear" => Ok(Instruction::Clear),
            "madd" => Ok(Instruction::Add(rest.parse()?)),
            "start" => Ok(Instruction::Start),
            "stop" => Ok(Instruction::Stop),
            "mute" => match rest {
                "1" => Ok(Instruction::Mute(true)),
                "0" => Ok(Instruction::Mute(false)),
                _ => Err(ParseError::InvalidNumber {
                    key: "mute".to_string(),
                    value: rest.to_string(),
                }),
            },
            _ => Err(ParseError::UnknownKeyword(keyword.to_string())),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Distance(meters) => write!(f, "dist={}", meters),
            Condition::Time(seconds) => write!(f, "time={}", seconds),
            Condition::Turn(degrees) => write!(f, "turn={}", degrees),
            Condition::Sensor {
                name,
                op,
                threshold,
            } => write!(f, "{}{}{}", name, op.symbol(), threshold),
            Condition::Count(count) => write!(f, "count={}", count),
        }
    }
}

/// Segment in canonical line form, without the `madd` keyword.
impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut params = Vec::with_capacity(6);

        if let Some(label) = self.label {
            params.push(format!("label={}", label));
        }

        match &self.directive {
            Directive::Motion(motion) => {
                if let Some(velocity) = motion.velocity {
                    params.push(format!("vel={}", velocity));
                }
                match motion.steering {
                    Steering::None => {}
                    Steering::TurnRadius(radius) => params.push(format!("tr={}", radius)),
                    Steering::EdgeLeft(offset) => params.push(format!("edgel={}", offset)),
                    Steering::EdgeRight(offset) => params.push(format!("edger={}", offset)),
                }
                if let Some(actuator) = &motion.actuator {
                    params.push(format!("servo={}", actuator.id));
                    params.push(format!("pservo={}", actuator.position));
                    params.push(format!("vservo={}", actuator.rate));
                }
            }
            Directive::Jump { label, .. } => params.push(format!("goto={}", label)),
        }

        write!(f, "{}:{}", params.join(", "), self.condition())
    }
}

impl FromStr for Segment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let (params, clause) = match s.split_once(':') {
            Some((params, clause)) => (params, Some(clause)),
            None => (s, None),
        };

        let mut fields = BTreeMap::new();
        for param in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| ParseError::Malformed(param.to_string()))?;

            let key = key.trim();
            if !MOTION_KEYS.contains(&key) {
                return Err(ParseError::UnknownKey(key.to_string()));
            }
            if fields.insert(key, value.trim()).is_some() {
                return Err(ParseError::DuplicateKey(key.to_string()));
            }
        }

        let condition = clause.map(parse_condition).transpose()?;
        let label = fields.remove("label").map(|v| integer("label", v)).transpose()?;

        if let Some(target) = fields.remove("goto") {
            if let Some(key) = fields.keys().next() {
                return Err(ParseError::ConflictingKeys("goto".to_string(), key.to_string()));
            }

            let count = match condition {
                Some(Condition::Count(count)) => count,
                Some(other) => return Err(ParseError::Malformed(other.to_string())),
                None => return Err(ParseError::MissingKey("count")),
            };

            return Ok(Segment {
                label,
                directive: Directive::Jump {
                    label: integer("goto", target)?,
                    count,
                },
            });
        }

        let velocity = fields.remove("vel").map(|v| real("vel", v)).transpose()?;

        let mut steering = Steering::None;
        for key in ["tr", "edgel", "edger"] {
            if let Some(value) = fields.remove(key) {
                let value = real(key, value)?;
                let previous = std::mem::replace(
                    &mut steering,
                    match key {
                        "tr" => Steering::TurnRadius(value),
                        "edgel" => Steering::EdgeLeft(value),
                        _ => Steering::EdgeRight(value),
                    },
                );
                if previous != Steering::None {
                    return Err(ParseError::ConflictingKeys(
                        steering_key(&previous).to_string(),
                        key.to_string(),
                    ));
                }
            }
        }

        let actuator = match (
            fields.remove("servo"),
            fields.remove("pservo"),
            fields.remove("vservo"),
        ) {
            (None, None, None) => None,
            (Some(id), Some(position), Some(rate)) => Some(Actuator::new(
                integer("servo", id)?,
                real("pservo", position)?,
                real("vservo", rate)?,
            )),
            (None, _, _) => return Err(ParseError::MissingKey("servo")),
            (_, None, _) => return Err(ParseError::MissingKey("pservo")),
            (_, _, None) => return Err(ParseError::MissingKey("vservo")),
        };

        Ok(Segment {
            label,
            directive: Directive::Motion(Motion {
                velocity,
                steering,
                actuator,
                condition: condition.ok_or(ParseError::MissingCondition)?,
            }),
        })
    }
}

fn steering_key(steering: &Steering) -> &'static str {
    match steering {
        Steering::None => "",
        Steering::TurnRadius(_) => "tr",
        Steering::EdgeLeft(_) => "edgel",
        Steering::EdgeRight(_) => "edger",
    }
}

fn parse_condition(clause: &str) -> Result<Condition, ParseError> {
    let clause = clause.trim();
    if clause.is_empty() {
        return Err(ParseError::MissingCondition);
    }
    if clause.contains(',') {
        return Err(ParseError::MultipleConditions);
    }

    if let Some(pos) = clause.find(['<', '>']) {
        let name = clause[..pos].trim();
        if name.is_empty() {
            return Err(ParseError::Malformed(clause.to_string()));
        }

        let op = if clause[pos..].starts_with('<') {
            Comparison::Less
        } else {
            Comparison::Greater
        };

        return Ok(Condition::Sensor {
            name: name.to_string(),
            op,
            threshold: real(name, &clause[pos + 1..])?,
        });
    }

    let (key, value) = clause
        .split_once('=')
        .ok_or_else(|| ParseError::Malformed(clause.to_string()))?;

    match key.trim() {
        "dist" => Ok(Condition::Distance(real("dist", value)?)),
        "time" => Ok(Condition::Time(real("time", value)?)),
        "turn" => Ok(Condition::Turn(real("turn", value)?)),
        "count" => Ok(Condition::Count(integer("count", value)?)),
        other => Err(ParseError::UnknownKey(other.to_string())),
    }
}

fn real(key: &str, value: &str) -> Result<f64, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        key: key.to_string(),
        value: value.trim().to_string(),
    })
}

fn integer<T: FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        key: key.to_string(),
        value: value.trim().to_string(),
    })
}

/// Parse an inbound event notification.
///
/// Event lines have the form `event <index>`, optionally preceded by the
/// name of the source device (`regbot event 0` or `regbot:event 0`). Only
/// unprefixed lines and lines from `target` are accepted, other devices on
/// the bridge may report events of their own.
/// Returns `None` if the line is not an event notification of the target.
pub fn parse_event(line: &str, target: &str) -> Option<Result<u8, ParseError>> {
    let mut tokens = line.split_whitespace();

    let first = tokens.next()?;
    let source = if first == "event" {
        None
    } else if let Some(source) = first.strip_suffix(":event") {
        Some(source)
    } else if tokens.next()? == "event" {
        Some(first)
    } else {
        return None;
    };

    if source.is_some_and(|source| source != target) {
        return None;
    }

    Some(match tokens.next() {
        Some(value) => integer("event", value),
        None => Err(ParseError::MissingKey("event")),
    })
}

/// Program listing parse error.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingError {
    /// Line number, starting at one.
    pub line: usize,
    pub error: ParseError,
}

impl std::fmt::Display for ListingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

impl std::error::Error for ListingError {}

/// Parse a program listing.
///
/// A listing holds one segment per line, either bare (`vel=0.1:dist=0.5`)
/// or as instruction with optional target (`regbot madd vel=0.1:dist=0.5`).
/// Blank lines and comments starting with `#` or `//` are skipped.
pub fn parse_listing(text: &str) -> Result<Vec<Segment>, ListingError> {
    let mut segments = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        let segment = listing_body(line).parse().map_err(|error| ListingError {
            line: index + 1,
            error,
        })?;

        segments.push(segment);
    }

    Ok(segments)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());

    &line[..end]
}

fn listing_body(line: &str) -> &str {
    match line.split_once(char::is_whitespace) {
        Some(("madd", rest)) => rest,
        Some((_, rest)) => match rest.trim_start().strip_prefix("madd") {
            Some(body) if body.starts_with(char::is_whitespace) => body,
            _ => line,
        },
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_segment() {
        let segment: Segment = Motion::until(Condition::distance(2.5))
            .velocity(0.5)
            .edge_right(0.0)
            .into();

        let instruction = Instruction::Add(segment.clone());
        let line = instruction.to_string();

        assert_eq!(line, "madd vel=0.5, edger=0:dist=2.5");
        assert_eq!(line.parse::<Instruction>().unwrap(), instruction);
        assert_eq!("vel=0.5, edger=0:dist=2.5".parse::<Segment>().unwrap(), segment);
    }

    #[test]
    fn test_control_instructions() {
        assert_eq!(Instruction::Clear.to_string(), "mclear");
        assert_eq!(Instruction::Start.to_string(), "start");
        assert_eq!(Instruction::Stop.to_string(), "stop");
        assert_eq!(Instruction::Mute(true).to_string(), "mute 1");
        assert_eq!(Instruction::Mute(false).to_string(), "mute 0");

        assert_eq!("mclear".parse::<Instruction>().unwrap(), Instruction::Clear);
        assert_eq!(" mute 1 ".parse::<Instruction>().unwrap(), Instruction::Mute(true));
        assert!("mute on".parse::<Instruction>().is_err());
        assert_eq!(
            "mdel 3".parse::<Instruction>(),
            Err(ParseError::UnknownKeyword("mdel".to_string()))
        );
        assert_eq!("".parse::<Instruction>(), Err(ParseError::Empty));
    }

    #[test]
    fn test_whitespace_tolerance() {
        let segment = "label=1,vel=0.05, tr=0: turn=-50".parse::<Segment>().unwrap();

        assert_eq!(segment.label, Some(1));
        assert_eq!(segment.to_string(), "label=1, vel=0.05, tr=0:turn=-50");

        let segment = "vel=0.25, edger=0:ir2 < 0.15".parse::<Segment>().unwrap();
        assert_eq!(segment.condition(), Condition::below("ir2", 0.15));
        assert_eq!(segment.to_string(), "vel=0.25, edger=0:ir2<0.15");

        let segment = "tr=0,vel=0.1:turn=180".parse::<Segment>().unwrap();
        assert_eq!(segment.to_string(), "vel=0.1, tr=0:turn=180");
    }

    #[test]
    fn test_jump() {
        let segment = "goto=1 : count = 2".parse::<Segment>().unwrap();

        assert_eq!(segment, Segment::jump(1, 2));
        assert_eq!(segment.to_string(), "goto=1:count=2");

        assert_eq!(
            "goto=1".parse::<Segment>(),
            Err(ParseError::MissingKey("count"))
        );
        assert_eq!(
            "goto=1, vel=0.1:count=1".parse::<Segment>(),
            Err(ParseError::ConflictingKeys("goto".to_string(), "vel".to_string()))
        );
        assert_eq!(
            "goto=1:count=1s".parse::<Segment>(),
            Err(ParseError::InvalidNumber {
                key: "count".to_string(),
                value: "1s".to_string()
            })
        );
    }

    #[test]
    fn test_actuator() {
        let segment = "servo=1, pservo=-700, vservo=0:time=1"
            .parse::<Segment>()
            .unwrap();

        let expected: Segment = Motion::until(Condition::time(1.0))
            .servo(1, -700.0, 0.0)
            .into();

        assert_eq!(segment, expected);
        assert_eq!(segment.to_string(), "servo=1, pservo=-700, vservo=0:time=1");

        assert_eq!(
            "pservo=2000, vservo=0:time=1".parse::<Segment>(),
            Err(ParseError::MissingKey("servo"))
        );
        assert_eq!(
            "servo=1, pservo=2000:time=1".parse::<Segment>(),
            Err(ParseError::MissingKey("vservo"))
        );
    }

    #[test]
    fn test_malformed_segments() {
        assert_eq!(
            "vel=0.5, edger=0".parse::<Segment>(),
            Err(ParseError::MissingCondition)
        );
        assert_eq!(
            "vel=0.5:".parse::<Segment>(),
            Err(ParseError::MissingCondition)
        );
        assert_eq!(
            "vel=0.5, edgel=1, edger=0:dist=1".parse::<Segment>(),
            Err(ParseError::ConflictingKeys("edgel".to_string(), "edger".to_string()))
        );
        assert_eq!(
            "vel=0.5, vel=0.2:dist=1".parse::<Segment>(),
            Err(ParseError::DuplicateKey("vel".to_string()))
        );
        assert_eq!(
            "acc=0.5:dist=1".parse::<Segment>(),
            Err(ParseError::UnknownKey("acc".to_string()))
        );
        assert_eq!(
            "vel=0.5:dist=1, time=2".parse::<Segment>(),
            Err(ParseError::MultipleConditions)
        );
        assert_eq!(
            "vel=0.5:speed=1".parse::<Segment>(),
            Err(ParseError::UnknownKey("speed".to_string()))
        );
        assert_eq!(
            "vel=fast:dist=1".parse::<Segment>(),
            Err(ParseError::InvalidNumber {
                key: "vel".to_string(),
                value: "fast".to_string()
            })
        );
        assert_eq!(
            "vel=0.5:<4".parse::<Segment>(),
            Err(ParseError::Malformed("<4".to_string()))
        );
    }

    #[test]
    fn test_condition_only() {
        let segment = "vel=0: ir2 > 0.5".parse::<Segment>().unwrap();
        assert_eq!(segment.condition(), Condition::above("ir2", 0.5));

        let segment: Segment = Motion::until(Condition::time(0.5)).into();
        assert_eq!(segment.to_string(), ":time=0.5");
        assert_eq!(":time=0.5".parse::<Segment>().unwrap(), segment);
    }

    #[test]
    fn test_parse_event() {
        assert_eq!(parse_event("event 0", "regbot"), Some(Ok(0)));
        assert_eq!(parse_event("regbot event 3", "regbot"), Some(Ok(3)));
        assert_eq!(parse_event("regbot:event 31", "regbot"), Some(Ok(31)));
        assert_eq!(parse_event("# hbt 12.3 0.1", "regbot"), None);
        assert_eq!(parse_event("", "regbot"), None);
        assert_eq!(
            parse_event("event", "regbot"),
            Some(Err(ParseError::MissingKey("event")))
        );
        assert!(matches!(
            parse_event("event x", "regbot"),
            Some(Err(ParseError::InvalidNumber { .. }))
        ));
    }

    #[test]
    fn test_parse_event_foreign_source() {
        assert_eq!(parse_event("teensy event 0", "regbot"), None);
        assert_eq!(parse_event("teensy:event 0", "regbot"), None);
        assert_eq!(parse_event("# event 3", "regbot"), None);
        assert_eq!(parse_event("teensy event 0", "teensy"), Some(Ok(0)));
    }

    #[test]
    fn test_parse_listing() {
        let text = "
            # Drive into box
            vel=0.25: ir2 < 0.1
            regbot madd vel=0.0: time=1 // wait
            madd vel=0.1,tr=0:turn=-90

            label=2, vel=0.1:dist=0.05
            goto=2:count=1
        ";

        let segments = parse_listing(text).unwrap();

        assert_eq!(segments.len(), 5);
        assert_eq!(segments[1].condition(), Condition::Time(1.0));
        assert_eq!(segments[2].to_string(), "vel=0.1, tr=0:turn=-90");
        assert_eq!(segments[4], Segment::jump(2, 1));
    }

    #[test]
    fn test_parse_listing_error_line() {
        let text = "vel=0.1:dist=0.5\n\nvel=0.1, edger=0\n";

        let error = parse_listing(text).unwrap_err();

        assert_eq!(error.line, 3);
        assert_eq!(error.error, ParseError::MissingCondition);
        assert_eq!(error.to_string(), "line 3: missing termination condition");
    }
}
