//! Named point-to-point mailboxes, one per task.
//!
//! Every task owns exactly one inbound [`Mailbox`]; anyone holding the [`PostOffice`] may post
//! to it. Names are fixed process-wide and only used for logging and telemetry.
use core::fmt::{self, Display, Formatter};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use super::commands::{Command, Reply, RobotMessage};
use crate::config::MAILBOX_DEPTH;

pub type Mailbox = Channel<CriticalSectionRawMutex, RobotMessage, MAILBOX_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxId {
    Drivetrain = 0,
    Autonomous = 1,
    /// Replies to the script interpreter's synchronous calls.
    AutoParser = 2,
    Climber = 3,
    Hopper = 4,
    GearIntake = 5,
    GearFloorIntake = 6,
}

impl MailboxId {
    pub const COUNT: usize = 7;

    /// Every task that must hear about robot state changes.
    pub const TASKS: [MailboxId; 6] = [
        MailboxId::Autonomous,
        MailboxId::Drivetrain,
        MailboxId::Climber,
        MailboxId::Hopper,
        MailboxId::GearIntake,
        MailboxId::GearFloorIntake,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            MailboxId::Drivetrain => "/tmp/qDrive",
            MailboxId::Autonomous => "/tmp/qAuto",
            MailboxId::AutoParser => "/tmp/qParse",
            MailboxId::Climber => "/tmp/qClimber",
            MailboxId::Hopper => "/tmp/qHopper",
            MailboxId::GearIntake => "/tmp/qGearIntake",
            MailboxId::GearFloorIntake => "/tmp/qGearFloor",
        }
    }
}

impl Display for MailboxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<usize> for MailboxId {
    fn from(value: usize) -> Self {
        match value {
            0 => MailboxId::Drivetrain,
            1 => MailboxId::Autonomous,
            2 => MailboxId::AutoParser,
            3 => MailboxId::Climber,
            4 => MailboxId::Hopper,
            5 => MailboxId::GearIntake,
            _ => MailboxId::GearFloorIntake,
        }
    }
}

/// All mailboxes of the robot, indexed by [`MailboxId`].
pub struct PostOffice {
    boxes: [Mailbox; MailboxId::COUNT],
}

impl Default for PostOffice {
    fn default() -> Self {
        Self::new()
    }
}

impl PostOffice {
    pub const fn new() -> Self {
        Self {
            boxes: [const { Channel::new() }; MailboxId::COUNT],
        }
    }

    pub fn mailbox(&self, id: MailboxId) -> &Mailbox {
        &self.boxes[id as usize]
    }

    /// Posts a message, waiting for room if the mailbox is full.
    pub async fn send(&self, to: MailboxId, message: RobotMessage) {
        self.mailbox(to).send(message).await;
    }

    /// Posts a message without waiting; a full mailbox drops it.
    pub fn try_send(&self, to: MailboxId, message: RobotMessage) -> bool {
        match self.mailbox(to).try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!("[POST] {to} full, dropped {:?}", dropped.command);
                false
            }
        }
    }

    /// Answers a synchronous call with the call's tag. Messages without a reply channel are left
    /// unanswered.
    pub async fn reply(&self, to: &RobotMessage, reply: Reply) {
        if let Some(reply_to) = to.reply_to {
            let answer = RobotMessage::new(reply.into()).tagged(to.call_id);
            self.send(reply_to, answer).await;
        }
    }

    /// Delivers the same command to every task mailbox.
    pub async fn broadcast(&self, command: Command) {
        for id in MailboxId::TASKS {
            self.send(id, RobotMessage::new(command)).await;
        }
    }

    /// Throws away whatever is queued for `id`, returning how many messages were dropped.
    pub fn discard(&self, id: MailboxId) -> usize {
        let mailbox = self.mailbox(id);
        let mut dropped = 0;
        while mailbox.try_receive().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
