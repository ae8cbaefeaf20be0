//! The loop every subsystem task runs.
//!
//! A component owns its hardware and one mailbox. Each cycle it takes the next message, or a
//! synthesised [`SystemCommand::MsgTimeout`] when the mailbox stayed quiet for a whole cycle,
//! and handles it start to finish before looking at the mailbox again. Whatever [`Reply`] the
//! component produces goes back to the sender if the message asked for one.
use embassy_time::{with_timeout, Duration};
use log::{debug, info, warn};

use crate::config::SAFETY_CHECK_INTERVAL;
use crate::robot::commands::{Command, Reply, RobotMessage, RobotMode, SystemCommand};
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;

#[allow(async_fn_in_trait)]
pub trait Component {
    /// Mailbox this component listens on.
    const ID: MailboxId;
    /// Log prefix, e.g. `[DRIVETRAIN]`.
    const STAMP: &'static str;

    /// Longest wait for a message before the component runs a `MsgTimeout` cycle.
    fn cycle(&self) -> Duration;

    async fn on_state_change(&mut self, mode: RobotMode, ctx: &Context<'_>);

    /// Runs every [`SAFETY_CHECK_INTERVAL`] cycles, before the message is handled. Returns
    /// `true` when it had to cut power; the message of that cycle is then not run.
    fn safety_check(&mut self, _ctx: &Context<'_>) -> bool {
        false
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply;
}

/// Handles exactly one message, waiting at most one cycle for it.
pub async fn run_cycle<C: Component>(component: &mut C, ctx: &Context<'_>, loops: &mut u32) {
    let mailbox = ctx.post.mailbox(C::ID);
    let message = with_timeout(component.cycle(), mailbox.receive())
        .await
        .unwrap_or_else(|_| RobotMessage::timeout());

    *loops = loops.wrapping_add(1);

    if let Command::State(mode) = message.command {
        info!("{} state {mode}", C::STAMP);
        component.on_state_change(mode, ctx).await;
        return;
    }

    if *loops % SAFETY_CHECK_INTERVAL == 0 && component.safety_check(ctx) {
        warn!("{} safety cutoff, skipped {:?}", C::STAMP, message.command);
        ctx.post.reply(&message, Reply::Error).await;
        return;
    }

    if !matches!(message.command, Command::System(SystemCommand::MsgTimeout)) {
        debug!("{} received {:?}", C::STAMP, message.command);
    }

    let reply = component.run(&message, ctx).await;
    ctx.post.reply(&message, reply).await;
}

pub async fn run_component<C: Component>(component: &mut C, ctx: Context<'_>) {
    info!("{} starting on {}", C::STAMP, C::ID);
    let mut loops = 0;
    loop {
        run_cycle(component, &ctx, &mut loops).await;
    }
}
