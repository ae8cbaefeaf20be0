//! Closed-loop motion sessions for the drivetrain.
//!
//! A session is created when a move or turn is accepted and converts its goal into encoder
//! counts or gyro degrees exactly once. Each call to `step` looks at the sensors and decides
//! the next wheel outputs, or that the session is over. The drivetrain task owns the timing.
//!
//! Motor orientation: the left motor is mounted reversed, so negative drives it forward.
use core::f32::consts::PI;

use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use micromath::F32Ext;

use crate::config::DriveConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelOutputs {
    pub left: f32,
    pub right: f32,
}

impl WheelOutputs {
    pub const STOP: WheelOutputs = WheelOutputs {
        left: 0.0,
        right: 0.0,
    };

    pub fn scaled(self, k: f32) -> Self {
        Self {
            left: self.left * k,
            right: self.right * k,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveEnd {
    Reached,
    TimedOut,
    /// The robot left autonomous before the goal or the deadline.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step<T> {
    Drive(T),
    Finished(MoveEnd),
}

pub fn inches_to_counts(inches: f32, config: &DriveConfig) -> f32 {
    inches / (PI * config.wheel_diameter_inches) * config.counts_per_rev
}

/// Shortens a target in counts by the distance the robot coasts after the motors stop. The
/// coast never eats more than half the target, so a nonzero move always moves.
pub fn coast_compensated(target_counts: f32, speed: f32, config: &DriveConfig) -> f32 {
    let coast = inches_to_counts((speed * config.coast_inches_per_speed).abs(), config)
        .min(target_counts.abs() / 2.0);
    if target_counts > 0.0 {
        target_counts - coast
    } else if target_counts < 0.0 {
        target_counts + coast
    } else {
        0.0
    }
}

/// Steering offset that pulls the heading back to `reference`.
pub fn heading_correction(heading: f32, reference: f32, divisor: f32) -> f32 {
    (heading - reference) / divisor
}

pub fn straight_outputs(speed: f32, offset: f32) -> WheelOutputs {
    WheelOutputs {
        left: -(speed - offset),
        right: speed + offset,
    }
}

/// Turn effort for a heading error, never weaker than `minimum` so the robot overcomes
/// static friction.
pub fn turn_output(error: f32, minimum: f32) -> f32 {
    let output = error / 180.0;
    if output > 0.0 && output < minimum {
        minimum
    } else if output < 0.0 && output > -minimum {
        -minimum
    } else {
        output
    }
}

/// What a straight drive is aiming for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StraightGoal {
    /// Travel this many inches.
    Distance(f32),
    /// Stop this many inches short of whatever the range finder sees.
    StandOff { range: f32, standoff: f32 },
    /// Drive until the deadline only.
    Timed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightDrive {
    pub speed: f32,
    /// `None` for a purely timed move.
    pub target_counts: Option<f32>,
    pub heading_reference: f32,
    pub deadline: Instant,
}

impl StraightDrive {
    pub fn start(
        speed: f32,
        goal: StraightGoal,
        timeout: Duration,
        now: Instant,
        config: &DriveConfig,
    ) -> Self {
        let target_counts = match goal {
            StraightGoal::Distance(inches) => Some(inches_to_counts(inches, config)),
            StraightGoal::StandOff { range, standoff } => {
                Some(inches_to_counts(range - standoff, config))
            }
            StraightGoal::Timed => None,
        }
        .map(|counts| coast_compensated(counts, speed, config));

        Self {
            speed,
            target_counts,
            heading_reference: 0.0,
            deadline: now + timeout,
        }
    }

    pub fn step(
        &self,
        now: Instant,
        in_auto: bool,
        encoder: i32,
        heading: f32,
        config: &DriveConfig,
    ) -> Step<WheelOutputs> {
        if !in_auto {
            return Step::Finished(MoveEnd::Cancelled);
        }
        if now >= self.deadline {
            return Step::Finished(MoveEnd::TimedOut);
        }
        if let Some(target) = self.target_counts {
            if (encoder as f32).abs() >= target.abs() {
                return Step::Finished(MoveEnd::Reached);
            }
        }

        let offset = heading_correction(heading, self.heading_reference, config.heading_divisor);
        Step::Drive(straight_outputs(self.speed, offset))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turn {
    pub target_angle: f32,
    pub deadline: Instant,
}

impl Turn {
    pub fn start(angle: f32, timeout: Duration, now: Instant) -> Self {
        Self {
            target_angle: angle,
            deadline: now + timeout,
        }
    }

    /// Output for both motors; with the left motor reversed the same value spins the robot.
    pub fn step(&self, now: Instant, in_auto: bool, heading: f32, config: &DriveConfig) -> Step<f32> {
        let error = heading - self.target_angle;
        if error.abs() <= config.turn_dead_band {
            return Step::Finished(MoveEnd::Reached);
        }
        if !in_auto {
            return Step::Finished(MoveEnd::Cancelled);
        }
        if now >= self.deadline {
            return Step::Finished(MoveEnd::TimedOut);
        }
        Step::Drive(turn_output(error, config.minimum_turn_speed))
    }
}

/// At most one session is active per drivetrain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MotionSession {
    #[default]
    Idle,
    StraightDriving(StraightDrive),
    Turning(Turn),
}

impl MotionSession {
    pub fn is_idle(&self) -> bool {
        matches!(self, MotionSession::Idle)
    }
}
