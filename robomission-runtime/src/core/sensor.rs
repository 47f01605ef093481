// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::collections::BTreeSet;

/// Signals published by the regbot controller.
///
/// - `lv` line valid
/// - `lo` line offset
/// - `xl` crossing line
/// - `xb` crossing black line
/// - `xw` crossing white line
/// - `ir1`, `ir2` infrared distance sensors
/// - `vel` measured velocity
const REGBOT_SIGNALS: [&str; 8] = ["lv", "lo", "xl", "xb", "xw", "ir1", "ir2", "vel"];

/// Set of sensor names the controller can compare against in a
/// termination condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorSet(BTreeSet<String>);

impl SensorSet {
    /// Construct an empty sensor set.
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Sensor set of the regbot controller.
    pub fn regbot() -> Self {
        Self(REGBOT_SIGNALS.iter().map(|s| s.to_string()).collect())
    }

    /// Register an additional sensor name.
    pub fn insert(&mut self, name: impl ToString) {
        self.0.insert(name.to_string());
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for SensorSet {
    fn default() -> Self {
        Self::regbot()
    }
}

impl<S: ToString> Extend<S> for SensorSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl std::fmt::Display for SensorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.iter().collect::<Vec<_>>().join(", "))
    }
}
