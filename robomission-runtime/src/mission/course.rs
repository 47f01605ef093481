// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

//! Built-in competition course.
//!
//! The course is run when no mission file is given. Every stage except the
//! goal waits for the controller to report the end of its program with
//! event 0.

use crate::core::{Condition, Motion, Segment};

use super::{Announcement, Completion, Mission, Stage};

/// Event raised by the controller when a program has finished.
const PROGRAM_DONE: u8 = 0;

/// Arm servo.
const ARM: u8 = 1;

fn dist(meters: f64) -> Condition {
    Condition::distance(meters)
}

fn time(seconds: f64) -> Condition {
    Condition::time(seconds)
}

fn turn(degrees: f64) -> Condition {
    Condition::turn(degrees)
}

fn below(sensor: &str, threshold: f64) -> Condition {
    Condition::below(sensor, threshold)
}

fn above(sensor: &str, threshold: f64) -> Condition {
    Condition::above(sensor, threshold)
}

fn drive(velocity: f64, condition: Condition) -> Motion {
    Motion::until(condition).velocity(velocity)
}

/// Spin in place.
fn rotate(velocity: f64, degrees: f64) -> Segment {
    drive(velocity, turn(degrees)).turn_radius(0.0).into()
}

/// Move the arm and hold still for a second.
fn arm(position: f64) -> Segment {
    Motion::until(time(1.0)).servo(ARM, position, 0.0).into()
}

/// Follow the line to the guillotine, wait underneath and continue.
fn guillotine() -> Stage {
    Stage::new(
        "guillotine",
        vec![
            drive(0.5, dist(2.5)).edge_right(0.0).into(),
            drive(0.0, time(1.0)).into(),
            drive(0.25, time(5.0)).edge_right(-1.0).into(),
            drive(0.25, time(1.0)).edge_right(0.0).into(),
        ],
        Completion::event(PROGRAM_DONE),
    )
    .with_announcement("Seventeen thirtyeight. Yah.", 0.75)
}

/// Grab the ball on the seesaw, carry it to the post and drop it in the hole.
fn seesaw() -> Stage {
    Stage::new(
        "seesaw",
        vec![
            arm(2000.0),
            drive(0.25, above("xl", 16.0)).edge_left(2.0).into(),
            drive(0.1, dist(0.1)).into(),
            rotate(0.1, 90.0),
            drive(0.25, dist(0.2)).edge_right(1.0).into(),
            drive(0.25, dist(0.85)).edge_right(2.0).into(),
            arm(-700.0),
            drive(-0.1, dist(0.165)).into(),
            arm(-650.0),
            drive(0.01, below("lv", 4.0)).edge_right(0.0).into(),
            arm(-700.0),
            // Goal
            drive(0.25, above("xl", 16.0)).into(),
            drive(0.1, dist(0.1)).into(),
            rotate(0.1, -90.0),
            drive(0.25, below("lv", 4.0)).edge_right(0.0).into(),
            drive(0.25, above("lv", 4.0)).into(),
            drive(0.1, below("ir2", 0.15)).edge_right(0.0).into(),
            rotate(0.1, 180.0),
            drive(0.25, time(10.0)).edge_left(2.0).into(),
            // Ramp up to the post
            drive(0.1, below("ir1", 0.3)).edge_left(2.0).into(),
            arm(-750.0),
            drive(0.25, dist(0.5)).into(),
            arm(-650.0),
            // Wiggle the ball into the hole
            drive(0.05, turn(-50.0)).turn_radius(0.0).label(1),
            rotate(0.1, 50.0),
            rotate(0.1, 50.0),
            rotate(0.1, -50.0),
            drive(0.1, dist(0.05)).into(),
            Segment::jump(1, 1),
            arm(2000.0),
            rotate(0.1, -180.0),
            drive(0.1, above("lv", 4.0)).into(),
        ],
        Completion::event(PROGRAM_DONE),
    )
}

fn intermission_rotary() -> Stage {
    Stage::new(
        "intermission_rotary",
        vec![
            drive(0.25, time(15.0)).edge_right(2.0).into(),
            drive(0.25, below("ir2", 0.15)).edge_right(2.0).into(),
            rotate(0.25, 180.0),
            drive(0.0, time(1.0)).into(),
            drive(0.25, dist(1.25)).edge_right(-1.0).into(),
            drive(0.25, above("xl", 10.0)).edge_right(-2.0).into(),
            drive(0.1, dist(0.15)).into(),
            rotate(0.25, -90.0),
        ],
        Completion::event(PROGRAM_DONE),
    )
}

/// Wait for the opening in the spinning disk and drive through.
fn rotary() -> Stage {
    Stage::new(
        "rotary",
        vec![
            drive(0.1, below("lv", 4.0)).edge_right(1.0).into(),
            drive(0.25, turn(-90.0)).turn_radius(0.1).into(),
            drive(0.05, below("ir2", 0.2)).edge_left(0.0).into(),
            drive(0.0, above("ir2", 0.5)).into(),
            drive(0.0, time(0.5)).into(),
            drive(0.5, below("lv", 4.0)).edge_right(0.0).into(),
            drive(0.35, above("xl", 16.0)).into(),
            rotate(0.2, -90.0),
        ],
        Completion::event(PROGRAM_DONE),
    )
    .with_announcement("Trap queen.", 0.3)
}

fn speed() -> Stage {
    Stage::new(
        "speed",
        vec![
            drive(0.5, dist(0.9)).edge_left(0.0).into(),
            drive(1.0, dist(2.5)).edge_left(-1.0).into(),
            Motion::until(time(0.0)).servo(ARM, -550.0, 0.2).into(),
            drive(1.0, dist(2.8)).edge_right(0.0).into(),
            drive(1.0, below("lv", 10.0)).edge_right(1.0).into(),
            Motion::until(time(0.0)).servo(ARM, 3000.0, 0.0).into(),
        ],
        Completion::event(PROGRAM_DONE),
    )
}

fn intermission_tunnel() -> Stage {
    Stage::new(
        "intermission_tunnel",
        vec![
            drive(0.1, dist(0.5)).into(),
            rotate(0.1, -90.0),
            drive(0.25, above("xl", 16.0)).into(),
            rotate(0.1, -90.0),
            drive(0.1, below("ir2", 0.2)).edge_right(0.0).into(),
            rotate(0.25, 180.0),
            drive(0.25, dist(0.2)).into(),
            rotate(0.1, -90.0),
        ],
        Completion::event(PROGRAM_DONE),
    )
}

/// Push the tunnel gate open, drive through and close it from the far side.
fn tunnel() -> Stage {
    Stage::new(
        "tunnel",
        vec![
            drive(0.25, below("ir2", 0.1)).into(),
            drive(0.0, time(1.0)).into(),
            rotate(0.1, -90.0),
            drive(-0.25, above("ir1", 0.5)).into(),
            rotate(0.1, 10.0),
            drive(0.2, dist(0.5)).into(),
            rotate(0.1, -10.0),
            drive(0.125, above("ir2", 0.1)).into(),
            // Through the tunnel
            drive(0.5, dist(0.2)).into(),
            drive(0.25, dist(0.5)).into(),
            rotate(0.25, 90.0),
            drive(0.25, dist(0.45)).into(),
            rotate(0.25, 97.0),
            drive(0.25, below("ir2", 0.1)).into(),
            drive(0.0, time(1.0)).into(),
            // Around to the second gate
            drive(0.25, dist(0.6)).into(),
            rotate(0.25, -97.0),
            drive(0.25, above("xl", 6.0)).into(),
            drive(0.25, dist(0.1)).into(),
            rotate(0.25, -90.0),
            drive(0.25, dist(0.6)).edge_right(0.0).into(),
            rotate(0.25, -90.0),
            drive(0.25, below("ir2", 0.1)).into(),
            rotate(0.25, 90.0),
            drive(0.25, dist(0.5)).into(),
            rotate(0.25, -90.0),
            drive(0.5, dist(0.2)).into(),
            drive(0.25, dist(1.0)).into(),
            // Back to the line
            rotate(0.25, -90.0),
            drive(0.25, dist(1.0)).into(),
            rotate(0.25, 90.0),
            drive(0.25, above("xl", 6.0)).into(),
            rotate(0.25, 90.0),
            drive(0.1, below("ir2", 0.1)).edge_right(0.0).into(),
            rotate(0.25, 180.0),
            drive(0.25, dist(0.75)).into(),
            rotate(0.25, -90.0),
            drive(0.25, above("xl", 6.0)).into(),
            drive(0.25, dist(0.1)).into(),
            rotate(0.25, -90.0),
        ],
        Completion::event(PROGRAM_DONE),
    )
}

fn goal() -> Stage {
    Stage::new(
        "goal",
        vec![
            arm(3000.0),
            drive(0.5, below("lv", 4.0)).edge_right(0.0).into(),
            drive(0.5, turn(-90.0)).turn_radius(0.25).into(),
            drive(0.5, above("xl", 16.0)).into(),
            drive(0.5, turn(-90.0)).turn_radius(0.25).into(),
            arm(-650.0),
            drive(0.5, below("ir2", 0.2)).edge_right(0.0).into(),
        ],
        Completion::FireAndForget,
    )
}

/// The competition course.
pub fn competition() -> Mission {
    Mission {
        name: "competition".to_string(),
        stages: vec![
            guillotine(),
            seesaw(),
            intermission_rotary(),
            rotary(),
            speed(),
            intermission_tunnel(),
            tunnel(),
            goal(),
        ],
        closing: Some(Announcement::new("17 38", 0.2)),
    }
}
