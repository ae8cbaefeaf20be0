//! Gear floor intake task: a roller on an arm that swings between the floor, a stowed drive
//! position and the peg release position.
//!
//! Arm positions are only known after the arm has been zeroed. Zeroing reads the absolute arm
//! sensor once, takes that as the drive position and derives the other two from it. The gear
//! sensor is a limit switch behind the roller; a gear arriving while the arm is down lifts it.
use embassy_time::{Duration, Timer};
use log::{info, warn};

use crate::config::ArmConfig;
use crate::robot::commands::{Command, FloorCommand, Reply, RobotMessage, RobotMode};
use crate::robot::hardware::{ControlMode, LimitSwitch, Motor, QuadEncoder};
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[GEAR_FLOOR]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmPosition {
    Unknown,
    Floor,
    Drive,
    Release,
}

impl ArmPosition {
    /// One step up, toward release.
    pub fn next(self) -> ArmPosition {
        match self {
            ArmPosition::Floor => ArmPosition::Drive,
            ArmPosition::Drive => ArmPosition::Release,
            ArmPosition::Release => ArmPosition::Release,
            ArmPosition::Unknown => ArmPosition::Drive,
        }
    }

    /// One step down, toward the floor.
    pub fn previous(self) -> ArmPosition {
        match self {
            ArmPosition::Floor => ArmPosition::Floor,
            ArmPosition::Drive => ArmPosition::Floor,
            ArmPosition::Release => ArmPosition::Drive,
            ArmPosition::Unknown => ArmPosition::Drive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArmPosition::Unknown => "UNKNOWN",
            ArmPosition::Floor => "INTAKE POS (0)",
            ArmPosition::Drive => "DRIVE POS (1)",
            ArmPosition::Release => "SCORE POS (2)",
        }
    }
}

/// Arm setpoints in sensor rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmSetpoints {
    pub floor: f32,
    pub drive: f32,
    pub release: f32,
}

impl ArmSetpoints {
    pub fn from_drive(drive: f32, config: &ArmConfig) -> Self {
        Self {
            floor: drive + config.floor_offset,
            drive,
            release: drive + config.release_offset,
        }
    }

    fn of(&self, position: ArmPosition) -> Option<f32> {
        match position {
            ArmPosition::Floor => Some(self.floor),
            ArmPosition::Drive => Some(self.drive),
            ArmPosition::Release => Some(self.release),
            ArmPosition::Unknown => None,
        }
    }
}

pub struct GearFloorIntake<M, E, L> {
    arm: M,
    roller: M,
    arm_sensor: E,
    gear_switch: L,
    config: ArmConfig,
    position: ArmPosition,
    setpoints: Option<ArmSetpoints>,
}

impl<M, E, L> GearFloorIntake<M, E, L>
where
    M: Motor,
    E: QuadEncoder,
    L: LimitSwitch,
{
    pub fn new(arm: M, roller: M, arm_sensor: E, gear_switch: L, config: ArmConfig) -> Self {
        Self {
            arm,
            roller,
            arm_sensor,
            gear_switch,
            config,
            position: ArmPosition::Unknown,
            setpoints: None,
        }
    }

    pub fn position(&self) -> ArmPosition {
        self.position
    }

    pub fn setpoints(&self) -> Option<ArmSetpoints> {
        self.setpoints
    }

    fn sensor_rotations(&self) -> f32 {
        self.arm_sensor.position() as f32 / self.config.counts_per_rotation
    }

    /// Takes the arm's current angle as the drive position and raises it to release.
    fn zero_arm(&mut self, ctx: &Context<'_>) -> ArmSetpoints {
        ctx.telemetry.put_string("SETTING:", "ZERO");
        self.arm.set_control_mode(ControlMode::Position);
        let setpoints = ArmSetpoints::from_drive(self.sensor_rotations(), &self.config);
        info!("{STAMP} zeroed {setpoints:?}");
        self.setpoints = Some(setpoints);
        self.move_arm(ArmPosition::Release, ctx);
        setpoints
    }

    fn move_arm(&mut self, target: ArmPosition, ctx: &Context<'_>) {
        let setpoints = match self.setpoints {
            Some(setpoints) => setpoints,
            None => self.zero_arm(ctx),
        };
        if let Some(rotations) = setpoints.of(target) {
            self.arm.set(rotations);
            self.position = target;
            ctx.telemetry.put_string("SETTING:", target.label());
        }
    }

    fn pull_in(&mut self, speed: f32) {
        let limit = match self.position {
            ArmPosition::Drive => self.config.max_intake_speed / 3.0,
            _ => self.config.max_intake_speed,
        };
        self.roller.set(speed.min(limit));
    }

    fn push_out(&mut self, speed: f32) {
        self.roller.set(-speed.min(self.config.max_intake_speed));
    }

    async fn hang_gear(&mut self, ctx: &Context<'_>) {
        info!("{STAMP} hang gear");
        self.roller.set(self.config.macro_roller_speed);
        Timer::after(self.config.macro_roller_time).await;
        self.roller.set(0.0);
        self.move_arm(ArmPosition::Floor, ctx);
        Timer::after(self.config.macro_floor_time).await;
        self.move_arm(ArmPosition::Release, ctx);
        Timer::after(self.config.macro_release_time).await;

        let dropped = ctx.post.discard(Self::ID);
        if dropped > 0 {
            info!("{STAMP} dropped {dropped} commands queued during the macro");
        }
    }
}

impl<M, E, L> Component for GearFloorIntake<M, E, L>
where
    M: Motor,
    E: QuadEncoder,
    L: LimitSwitch,
{
    const ID: MailboxId = MailboxId::GearFloorIntake;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        self.config.cycle
    }

    async fn on_state_change(&mut self, mode: RobotMode, ctx: &Context<'_>) {
        if mode.is_enabled() && self.setpoints.is_none() {
            self.zero_arm(ctx);
        }
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        let current = self.arm.output_current();
        let here = self.sensor_rotations();
        ctx.telemetry.put_number("Arm Current", current);
        ctx.telemetry.put_number("Arm Position", here);

        // hold where we are rather than push into whatever is in the way
        let tripped = current >= self.config.max_arm_current;
        if tripped {
            warn!("{STAMP} arm at {current:.1} A, holding");
            self.arm.set(here);
        }

        let gear = self.gear_switch.is_closed();
        ctx.telemetry.put_bool("Gear?", gear);
        if gear && self.position == ArmPosition::Floor {
            self.move_arm(ArmPosition::Drive, ctx);
        }
        tripped
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply {
        let Command::Floor(command) = message.command else {
            return Reply::Ok;
        };
        match command {
            FloorCommand::FloorPosition => self.move_arm(ArmPosition::Floor, ctx),
            FloorCommand::DrivePosition => self.move_arm(ArmPosition::Drive, ctx),
            FloorCommand::ReleasePosition => self.move_arm(ArmPosition::Release, ctx),
            FloorCommand::NextPosition => self.move_arm(self.position.next(), ctx),
            FloorCommand::PreviousPosition => self.move_arm(self.position.previous(), ctx),
            FloorCommand::PullIn(speed) => self.pull_in(speed),
            FloorCommand::PushOut(speed) => self.push_out(speed),
            FloorCommand::Stop => self.roller.set(0.0),
            FloorCommand::HangGear => self.hang_gear(ctx).await,
        }
        Reply::Ok
    }
}
