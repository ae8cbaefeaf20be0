//! Climber task: two motors mounted facing each other on one rope spool.
use embassy_time::{Duration, Instant, Timer};
use log::{info, warn};

use crate::config::ClimberConfig;
use crate::robot::commands::{ClimberCommand, Command, Reply, RobotMessage, RobotMode};
use crate::robot::hardware::Motor;
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[CLIMBER]";

pub struct Climber<M> {
    first: M,
    second: M,
    config: ClimberConfig,
}

impl<M: Motor> Climber<M> {
    pub fn new(first: M, second: M, config: ClimberConfig) -> Self {
        Self {
            first,
            second,
            config,
        }
    }

    fn climb(&mut self, speed: f32) {
        self.first.set(speed);
        self.second.set(-speed);
    }

    /// Climbs for the configured pulse time, or until autonomous ends.
    async fn pulse(&mut self, speed: f32, ctx: &Context<'_>) {
        let deadline = Instant::now() + self.config.pulse_time;
        while Instant::now() < deadline && ctx.mode.in_auto() {
            self.climb(speed);
            Timer::after(self.config.pulse_period).await;
        }
        self.climb(0.0);
    }
}

impl<M: Motor> Component for Climber<M> {
    const ID: MailboxId = MailboxId::Climber;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        self.config.cycle
    }

    async fn on_state_change(&mut self, _mode: RobotMode, _ctx: &Context<'_>) {
        self.climb(0.0);
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        let current = self.first.output_current();
        ctx.telemetry.put_number("Climber current", current);
        let tripped = current >= self.config.max_current;
        if tripped {
            warn!("{STAMP} {current:.1} A, stopping");
            self.climb(0.0);
        }
        tripped
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply {
        if let Command::Climber(command) = message.command {
            match command {
                ClimberCommand::Up(speed) => self.climb(speed),
                ClimberCommand::Down(speed) => self.climb(-speed),
                ClimberCommand::Stop => self.climb(0.0),
                ClimberCommand::Pulse(speed) => {
                    info!("{STAMP} pulse at {speed}");
                    self.pulse(speed, ctx).await;
                }
            }
        }
        Reply::Ok
    }
}
