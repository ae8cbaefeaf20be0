//! Hopper task: one motor lifting fuel toward the shooter.
use embassy_time::Duration;
use log::warn;

use crate::config::{COMPONENT_CYCLE, MAX_MOTOR_CURRENT_AMPS};
use crate::robot::commands::{Command, HopperCommand, Reply, RobotMessage, RobotMode};
use crate::robot::hardware::Motor;
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[HOPPER]";

pub struct Hopper<M> {
    motor: M,
    cycle: Duration,
}

impl<M: Motor> Hopper<M> {
    pub fn new(motor: M) -> Self {
        Self {
            motor,
            cycle: COMPONENT_CYCLE,
        }
    }
}

impl<M: Motor> Component for Hopper<M> {
    const ID: MailboxId = MailboxId::Hopper;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        self.cycle
    }

    async fn on_state_change(&mut self, _mode: RobotMode, _ctx: &Context<'_>) {
        self.motor.set(0.0);
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        let current = self.motor.output_current();
        ctx.telemetry.put_number("Hopper current", current);
        if current < MAX_MOTOR_CURRENT_AMPS {
            return false;
        }
        warn!("{STAMP} {current:.1} A, stopping");
        self.motor.set(0.0);
        true
    }

    async fn run(&mut self, message: &RobotMessage, _ctx: &Context<'_>) -> Reply {
        match message.command {
            Command::Hopper(HopperCommand::Up(speed)) => self.motor.set(speed),
            Command::Hopper(HopperCommand::Down(speed)) => self.motor.set(-speed),
            Command::Hopper(HopperCommand::Stop) => self.motor.set(0.0),
            _ => {}
        }
        Reply::Ok
    }
}
