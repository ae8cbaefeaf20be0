//! Synchronous and fire-and-forget calls from the script interpreter into the subsystem tasks.
//!
//! A call posts its commands with [`MailboxId::AutoParser`] as the reply channel and then waits on
//! that mailbox. Replies are counted, not matched to their sender: a call to N targets is done
//! after N replies, whichever tasks they came from. Each call tags its messages with a fresh id,
//! and replies bearing another id belong to an earlier call that gave up waiting.
use core::cell::Cell;
use core::fmt::{self, Display, Formatter};

use embassy_time::{with_timeout, Duration};
use log::{debug, error, warn};

use crate::robot::commands::{Command, Reply, RobotMessage};
use crate::robot::mailbox::{MailboxId, PostOffice};
use crate::robot::telemetry::Telemetry;

/// Dashboard key for everything the autonomous pipeline reports.
pub const STATUS_KEY: &str = "Auto Status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// Every target answered but at least one answered with an error.
    Rejected,
    LengthMismatch { targets: usize, commands: usize },
    TimedOut { received: usize, expected: usize },
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Rejected => f.write_str("a subsystem answered with an error"),
            CallError::LengthMismatch { targets, commands } => {
                write!(f, "{targets} targets for {commands} commands")
            }
            CallError::TimedOut { received, expected } => {
                write!(f, "timed out after {received} of {expected} replies")
            }
        }
    }
}

impl core::error::Error for CallError {}

pub struct Caller<'a> {
    post: &'a PostOffice,
    telemetry: &'a dyn Telemetry,
    reply_timeout: Option<Duration>,
    last_call: Cell<u32>,
}

impl<'a> Caller<'a> {
    pub fn new(
        post: &'a PostOffice,
        telemetry: &'a dyn Telemetry,
        reply_timeout: Option<Duration>,
    ) -> Self {
        Self {
            post,
            telemetry,
            reply_timeout,
            last_call: Cell::new(0),
        }
    }

    fn next_call_id(&self) -> u32 {
        // zero marks untagged replies
        let id = self.last_call.get().wrapping_add(1).max(1);
        self.last_call.set(id);
        id
    }

    pub fn telemetry(&self) -> &'a dyn Telemetry {
        self.telemetry
    }

    /// Posts a command nobody answers.
    pub async fn send(&self, to: MailboxId, command: Command) {
        self.post.send(to, RobotMessage::new(command)).await;
    }

    /// Posts one command and waits for its reply.
    pub async fn call(&self, to: MailboxId, command: Command) -> Result<(), CallError> {
        self.call_many(&[to], &[command]).await
    }

    /// Posts `commands[i]` to `targets[i]` and waits until every target has answered.
    ///
    /// An error reply does not end the wait early. With a reply timeout configured, the whole
    /// exchange gets that long; without one it waits as long as it takes.
    pub async fn call_many(&self, targets: &[MailboxId], commands: &[Command]) -> Result<(), CallError> {
        if targets.len() != commands.len() {
            self.telemetry.put_string(STATUS_KEY, "MULTICOMMAND error!");
            error!(
                "[AUTO] {} targets for {} commands, nothing sent",
                targets.len(),
                commands.len()
            );
            return Err(CallError::LengthMismatch {
                targets: targets.len(),
                commands: commands.len(),
            });
        }

        let call_id = self.next_call_id();
        let stale = self.post.discard(MailboxId::AutoParser);
        if stale > 0 {
            warn!("[AUTO] dropped {stale} late replies");
        }

        for (&to, &command) in targets.iter().zip(commands) {
            self.post
                .send(
                    to,
                    RobotMessage::with_reply(command, MailboxId::AutoParser).tagged(call_id),
                )
                .await;
        }

        let expected = targets.len();
        let mut received = 0;
        let mut failed = false;
        let replies = async {
            let mailbox = self.post.mailbox(MailboxId::AutoParser);
            while received < expected {
                let message = mailbox.receive().await;
                if message.call_id != call_id {
                    warn!("[AUTO] dropped a late reply to call {}", message.call_id);
                    continue;
                }
                match message.command.as_reply() {
                    Some(Reply::Ok) => {
                        self.telemetry.put_string(STATUS_KEY, "auto ok");
                    }
                    Some(Reply::Error) => {
                        self.telemetry.put_string(STATUS_KEY, "EARLY DEATH!");
                        failed = true;
                    }
                    None => {
                        warn!("[AUTO] ignoring {:?} on the reply channel", message.command);
                        continue;
                    }
                }
                received += 1;
                debug!("[AUTO] response {received}/{expected}");
            }
        };

        let finished = match self.reply_timeout {
            Some(timeout) => with_timeout(timeout, replies).await.is_ok(),
            None => {
                replies.await;
                true
            }
        };

        if !finished {
            self.telemetry.put_string(STATUS_KEY, "EARLY DEATH!");
            error!("[AUTO] only {received} of {expected} replies arrived");
            return Err(CallError::TimedOut { received, expected });
        }
        if failed {
            return Err(CallError::Rejected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::commands::{AutoCommand, ClimberCommand, DriveCommand, HopperCommand};
    use crate::sim::RecordingTelemetry;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;

    fn stop() -> Command {
        Command::Drive(DriveCommand::Stop)
    }

    #[test]
    fn mismatched_lists_send_nothing() {
        let post = PostOffice::new();
        let telemetry = RecordingTelemetry::new();
        let caller = Caller::new(&post, &telemetry, None);

        let result = block_on(caller.call_many(
            &[MailboxId::Drivetrain, MailboxId::Climber],
            &[stop()],
        ));
        assert_eq!(
            result,
            Err(CallError::LengthMismatch {
                targets: 2,
                commands: 1
            })
        );
        assert!(post.mailbox(MailboxId::Drivetrain).is_empty());
        assert!(post.mailbox(MailboxId::Climber).is_empty());
        assert!(telemetry.saw(STATUS_KEY, "MULTICOMMAND error!"));
    }

    #[test]
    fn waits_for_every_reply_and_reports_any_error() {
        let post = PostOffice::new();
        let telemetry = RecordingTelemetry::new();
        let caller = Caller::new(&post, &telemetry, Some(Duration::from_secs(1)));
        let targets = [MailboxId::Drivetrain, MailboxId::Climber, MailboxId::Hopper];
        let commands = [
            stop(),
            Command::Climber(ClimberCommand::Stop),
            Command::Hopper(HopperCommand::Stop),
        ];

        // Answer out of order, with the error in the middle
        let responders = async {
            let hopper = post.mailbox(MailboxId::Hopper).receive().await;
            let climber = post.mailbox(MailboxId::Climber).receive().await;
            let drive = post.mailbox(MailboxId::Drivetrain).receive().await;
            post.reply(&hopper, Reply::Ok).await;
            post.reply(&drive, Reply::Error).await;
            Timer::after_millis(20).await;
            post.reply(&climber, Reply::Ok).await;
        };

        let (result, ()) = block_on(join(caller.call_many(&targets, &commands), responders));
        assert_eq!(result, Err(CallError::Rejected));
        assert!(post.mailbox(MailboxId::AutoParser).is_empty());
        assert!(telemetry.saw(STATUS_KEY, "EARLY DEATH!"));
        // the last reply was an ok, so the wait continued past the error
        assert_eq!(telemetry.last(STATUS_KEY).as_deref(), Some("auto ok"));
    }

    #[test]
    fn a_single_call_succeeds_on_ok() {
        let post = PostOffice::new();
        let telemetry = RecordingTelemetry::new();
        let caller = Caller::new(&post, &telemetry, None);

        let responder = async {
            let message = post.mailbox(MailboxId::Drivetrain).receive().await;
            assert_eq!(message.reply_to, Some(MailboxId::AutoParser));
            post.reply(&message, Reply::Ok).await;
        };
        let (result, ()) = block_on(join(caller.call(MailboxId::Drivetrain, stop()), responder));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn a_late_reply_arriving_mid_call_is_not_counted() {
        let post = PostOffice::new();
        let telemetry = RecordingTelemetry::new();
        let caller = Caller::new(&post, &telemetry, Some(Duration::from_millis(30)));

        let first = block_on(caller.call(MailboxId::Drivetrain, stop()));
        assert!(matches!(first, Err(CallError::TimedOut { .. })));
        let Ok(slow) = post.mailbox(MailboxId::Drivetrain).try_receive() else {
            panic!("the first call never reached the drivetrain");
        };

        // The drivetrain finishes the first move while the second call is waiting on the hopper
        let late_answer = async {
            let hopper = post.mailbox(MailboxId::Hopper).receive().await;
            post.reply(&slow, Reply::Ok).await;
            hopper
        };
        let (second, hopper) = block_on(join(
            caller.call(MailboxId::Hopper, Command::Hopper(HopperCommand::Stop)),
            late_answer,
        ));
        assert_eq!(
            second,
            Err(CallError::TimedOut {
                received: 0,
                expected: 1
            })
        );
        assert_ne!(hopper.call_id, slow.call_id);
    }

    #[test]
    fn silent_targets_time_out_and_stale_replies_are_dropped() {
        let post = PostOffice::new();
        let telemetry = RecordingTelemetry::new();
        let caller = Caller::new(&post, &telemetry, Some(Duration::from_millis(30)));

        let result = block_on(caller.call_many(
            &[MailboxId::Drivetrain, MailboxId::Climber],
            &[stop(), Command::Climber(ClimberCommand::Stop)],
        ));
        assert_eq!(
            result,
            Err(CallError::TimedOut {
                received: 0,
                expected: 2
            })
        );

        // The drivetrain answers late; the next call must not count that answer
        block_on(post.send(
            MailboxId::AutoParser,
            RobotMessage::new(Command::Auto(AutoCommand::ResponseOk)),
        ));
        let result = block_on(caller.call(MailboxId::Hopper, Command::Hopper(HopperCommand::Stop)));
        assert_eq!(
            result,
            Err(CallError::TimedOut {
                received: 0,
                expected: 1
            })
        );
    }
}
