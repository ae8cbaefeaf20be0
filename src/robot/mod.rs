//! Core robot types shared by every task.
//!
//! - [`commands`]: the message vocabulary passed between tasks.
//! - [`mailbox`]: named per-task mailboxes and the [`mailbox::PostOffice`] that owns them.
//! - [`state`]: the robot mode flag read across task boundaries.
//! - [`hardware`]: traits for the motors and sensors each subsystem owns.
//! - [`telemetry`]: the write-only dashboard sink.
pub mod commands;
pub mod hardware;
pub mod mailbox;
pub mod state;
pub mod telemetry;

use mailbox::PostOffice;
use state::ModeFlag;
use telemetry::Telemetry;

/// Shared services every task receives: where to post, which mode the robot is in, and where
/// to report status.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub post: &'a PostOffice,
    pub mode: &'a ModeFlag,
    pub telemetry: &'a dyn Telemetry,
}

impl<'a> Context<'a> {
    pub fn new(post: &'a PostOffice, mode: &'a ModeFlag, telemetry: &'a dyn Telemetry) -> Self {
        Self {
            post,
            mode,
            telemetry,
        }
    }
}
