//! Gear intake task: a gripper closed by one motor.
//!
//! The gripper never jumps between open and closed. Every hold or release starts a timed
//! transition that settles after [`GearIntakeConfig::transition_time`]:
//!
//! | state     | Hold      | Release   | Stop   | settled   |
//! |-----------|-----------|-----------|--------|-----------|
//! | `Open`    | `Closing` | `Opening` | `Open` |           |
//! | `Opening` | `Closing` | `Opening` | `Open` | `Open`    |
//! | `Closing` | `Closing` | `Opening` | `Closed` | `Closed` |
//! | `Closed`  | `Closing` | `Opening` | `Closed` |         |
use embassy_time::{Duration, Instant};
use log::{info, warn};

use crate::config::GearIntakeConfig;
use crate::robot::commands::{Command, GearCommand, Reply, RobotMessage, RobotMode};
use crate::robot::hardware::Motor;
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[GEAR_INTAKE]";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grip {
    Open,
    Opening { since: Instant },
    Closing { since: Instant },
    Closed,
}

impl Grip {
    pub fn on_hold(self, now: Instant) -> Grip {
        match self {
            Grip::Closing { .. } => self,
            _ => Grip::Closing { since: now },
        }
    }

    pub fn on_release(self, now: Instant) -> Grip {
        match self {
            Grip::Opening { .. } => self,
            _ => Grip::Opening { since: now },
        }
    }

    pub fn on_stop(self) -> Grip {
        match self {
            Grip::Open | Grip::Opening { .. } => Grip::Open,
            Grip::Closed | Grip::Closing { .. } => Grip::Closed,
        }
    }

    /// Transition states settle once the motor has run long enough.
    pub fn settle(self, now: Instant, after: Duration) -> Grip {
        match self {
            Grip::Opening { since } if now >= since + after => Grip::Open,
            Grip::Closing { since } if now >= since + after => Grip::Closed,
            _ => self,
        }
    }
}

pub struct GearIntake<M> {
    motor: M,
    config: GearIntakeConfig,
    grip: Grip,
    speed: f32,
}

impl<M: Motor> GearIntake<M> {
    pub fn new(motor: M, config: GearIntakeConfig) -> Self {
        Self {
            motor,
            config,
            grip: Grip::Open,
            speed: 0.0,
        }
    }

    pub fn grip(&self) -> Grip {
        self.grip
    }

    fn apply(&mut self) {
        let output = match self.grip {
            Grip::Open => 0.0,
            Grip::Opening { .. } => self.speed,
            Grip::Closing { .. } => -self.speed,
            Grip::Closed => -self.config.hold_tension,
        };
        self.motor.set(output);
    }

    fn stop(&mut self) {
        self.grip = self.grip.on_stop();
        self.motor.set(0.0);
    }
}

impl<M: Motor> Component for GearIntake<M> {
    const ID: MailboxId = MailboxId::GearIntake;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        self.config.cycle
    }

    async fn on_state_change(&mut self, mode: RobotMode, _ctx: &Context<'_>) {
        if !mode.is_enabled() {
            self.stop();
        }
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        let current = self.motor.output_current();
        ctx.telemetry.put_number("Gear current", current);
        let tripped = current >= self.config.max_current;
        if tripped {
            warn!("{STAMP} {current:.1} A, stopping");
            self.stop();
        }
        tripped
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply {
        let now = Instant::now();
        let before = self.grip;

        self.grip = match message.command {
            Command::Gear(GearCommand::Hold(speed)) => {
                self.speed = speed;
                self.grip.on_hold(now)
            }
            Command::Gear(GearCommand::Release(speed)) => {
                self.speed = speed;
                self.grip.on_release(now)
            }
            Command::Gear(GearCommand::Stop) => {
                self.stop();
                return Reply::Ok;
            }
            _ => self.grip.settle(now, self.config.transition_time),
        };

        if core::mem::discriminant(&before) != core::mem::discriminant(&self.grip) {
            info!("{STAMP} {before:?} -> {:?}", self.grip);
            ctx.telemetry.put_bool("Gear closed", self.grip == Grip::Closed);
        }
        self.apply();
        Reply::Ok
    }
}
