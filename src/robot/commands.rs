//! Command types for inter-task communication.
//!
//! A [`RobotMessage`] carries one [`Command`] and, for synchronous calls, the
//! [`MailboxId`] the receiver must answer on. Each command family is its own enum and
//! carries only the parameters that family needs.
use core::fmt::{self, Display, Formatter};

use super::mailbox::MailboxId;

/// Operating mode reported by the driver station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotMode {
    Disabled,
    Autonomous,
    Teleoperated,
    Test,
    Unknown,
}

impl RobotMode {
    pub fn is_enabled(self) -> bool {
        matches!(
            self,
            RobotMode::Autonomous | RobotMode::Teleoperated | RobotMode::Test
        )
    }
}

impl Display for RobotMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RobotMode::Disabled => f.write_str("ROBOT_STATE_DISABLED"),
            RobotMode::Autonomous => f.write_str("ROBOT_STATE_AUTONOMOUS"),
            RobotMode::Teleoperated => f.write_str("ROBOT_STATE_TELEOPERATED"),
            RobotMode::Test => f.write_str("ROBOT_STATE_TEST"),
            RobotMode::Unknown => f.write_str("ROBOT_STATE_UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemCommand {
    /// Synthesised by a component when its mailbox stays quiet for a whole cycle.
    MsgTimeout,
    Constants { battery_voltage: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCommand {
    /// A script session begins.
    Run,
    /// The script session is over.
    Complete,
    ResponseOk,
    ResponseError,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveParams {
    pub speed: f32,
    /// Inches to travel for a measured move, inches to stand off for a proximity move.
    pub distance: f32,
    /// Seconds.
    pub timeout: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveCommand {
    Stop,
    Tank { left: f32, right: f32 },
    Cheesy { wheel: f32, throttle: f32, quickturn: bool },
    AutoMove { left: f32, right: f32 },
    MeasuredMove(MoveParams),
    ProximityMove(MoveParams),
    TimedMove { speed: f32, time: f32 },
    Turn { angle: f32, timeout: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GearCommand {
    Hold(f32),
    Release(f32),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloorCommand {
    FloorPosition,
    DrivePosition,
    ReleasePosition,
    NextPosition,
    PreviousPosition,
    PullIn(f32),
    PushOut(f32),
    Stop,
    HangGear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimberCommand {
    Up(f32),
    Down(f32),
    Stop,
    /// Short timed climb used by autonomous scripts.
    Pulse(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HopperCommand {
    Up(f32),
    Down(f32),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    State(RobotMode),
    System(SystemCommand),
    Auto(AutoCommand),
    Drive(DriveCommand),
    Gear(GearCommand),
    Floor(FloorCommand),
    Climber(ClimberCommand),
    Hopper(HopperCommand),
}

/// Result a subsystem reports back to a synchronous caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error,
}

impl From<Reply> for Command {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Ok => Command::Auto(AutoCommand::ResponseOk),
            Reply::Error => Command::Auto(AutoCommand::ResponseError),
        }
    }
}

impl Command {
    /// Reads a response tag back out of a command, if it is one.
    pub fn as_reply(&self) -> Option<Reply> {
        match self {
            Command::Auto(AutoCommand::ResponseOk) => Some(Reply::Ok),
            Command::Auto(AutoCommand::ResponseError) => Some(Reply::Error),
            _ => None,
        }
    }
}

/// A complete message; never mutated once it has been posted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotMessage {
    pub command: Command,
    pub reply_to: Option<MailboxId>,
    /// Tags a synchronous call; the reply carries the same tag back. Zero when untagged.
    pub call_id: u32,
}

impl RobotMessage {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            reply_to: None,
            call_id: 0,
        }
    }

    pub fn with_reply(command: Command, reply_to: MailboxId) -> Self {
        Self {
            command,
            reply_to: Some(reply_to),
            call_id: 0,
        }
    }

    pub fn tagged(self, call_id: u32) -> Self {
        Self { call_id, ..self }
    }

    pub fn timeout() -> Self {
        Self::new(Command::System(SystemCommand::MsgTimeout))
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}

impl From<Command> for RobotMessage {
    fn from(command: Command) -> Self {
        Self::new(command)
    }
}
