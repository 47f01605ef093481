// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

pub use self::program::{BuildError, Program, ProgramBuilder};
pub use self::segment::{Actuator, Comparison, Condition, Directive, Motion, Segment, Steering};
pub use self::sensor::SensorSet;

mod program;
mod segment;
mod sensor;
