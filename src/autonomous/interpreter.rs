//! Executes one script line at a time.
//!
//! [`Interpreter::evaluate`] parses a line, waits out any pause, then carries the statement out:
//! fire-and-forget commands are posted and forgotten, motion commands are synchronous calls that
//! hold the script until the drivetrain answers. The return value tells the sequencer whether
//! the script is over.
use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info, warn};

use super::control::AutoControl;
use super::parser::{split_keyword, Keyword, ParseError, Statement, COMMENT};
use super::protocol::{CallError, Caller, STATUS_KEY};
use crate::config::{seconds, AutoConfig};
use crate::robot::commands::{
    AutoCommand, ClimberCommand, Command, DriveCommand, FloorCommand, GearCommand,
};
use crate::robot::mailbox::MailboxId;

const STAMP: &str = "[AUTO]";

pub struct Interpreter<'a> {
    caller: Caller<'a>,
    control: &'a AutoControl,
    config: AutoConfig,
    started: Instant,
    line_number: usize,
    mode_block: i32,
    dispatched: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(caller: Caller<'a>, control: &'a AutoControl, config: AutoConfig) -> Self {
        Self {
            caller,
            control,
            config,
            started: Instant::now(),
            line_number: 0,
            mode_block: 0,
            dispatched: 0,
        }
    }

    /// Resets the clock and counters for a new script run.
    pub fn restart(&mut self) {
        self.started = Instant::now();
        self.line_number = 0;
        self.mode_block = 0;
        self.dispatched = 0;
    }

    /// 1-based line number used in log output.
    pub fn set_line_number(&mut self, line_number: usize) {
        self.line_number = line_number;
    }

    pub fn mode_block(&self) -> i32 {
        self.mode_block
    }

    /// Lines whose keyword was recognised since the last [`Interpreter::restart`].
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn control(&self) -> &'a AutoControl {
        self.control
    }

    fn elapsed(&self) -> f32 {
        self.started.elapsed().as_micros() as f32 / 1_000_000.0
    }

    fn status(&self, status: &str) {
        self.caller.telemetry().put_string(STATUS_KEY, status);
    }

    /// Runs one line. Returns `true` when the script must stop.
    pub async fn evaluate(&mut self, line: &str) -> bool {
        if line.is_empty() {
            debug!("{STAMP} statement is empty");
            return false;
        }
        if line.trim_start().starts_with(COMMENT) {
            return false;
        }

        let (keyword, args) = match split_keyword(line, self.config.keyword_match) {
            Ok(found) => found,
            Err(e) => {
                if e == ParseError::MissingToken {
                    self.status("DEATH BY PARAMS!");
                }
                self.status(terminal_status(e));
                error!("{STAMP} {:.3} line {}: {e}: {line}", self.elapsed(), self.line_number);
                return true;
            }
        };

        // A pause holds the line that is already parsed; it runs as soon as the pause lifts
        self.control.wait_while_paused(self.config.pause_poll).await;

        if self.control.debug() {
            info!("{STAMP} {:.3} {} {}", self.elapsed(), keyword, args.rest());
        }
        self.dispatched += 1;

        match keyword.parse(args) {
            Ok(statement) => self.execute(statement, line).await,
            Err(e) => {
                warn!("{STAMP} line {}: {e}", self.line_number);
                self.status(failure_status(keyword));
                false
            }
        }
    }

    async fn execute(&mut self, statement: Statement<'_>, line: &str) -> bool {
        let drive = MailboxId::Drivetrain;
        match statement {
            Statement::Mode(block) => {
                self.mode_block = block;
                info!("{STAMP} mode block {block}");
            }
            Statement::Debug(on) => self.control.set_debug(on),
            Statement::Message(text) => {
                info!("{STAMP} {:.3} {:03}: {text}", self.elapsed(), self.line_number);
            }
            Statement::Begin => {
                self.caller.send(drive, Command::Auto(AutoCommand::Run)).await;
                self.status("begin");
            }
            Statement::End => {
                self.caller
                    .send(drive, Command::Auto(AutoCommand::Complete))
                    .await;
                self.status("done");
                info!("{STAMP} {:.3} {line}", self.elapsed());
                return true;
            }
            Statement::Delay(secs) => {
                self.status("wait");
                self.delay(seconds(secs)).await;
            }
            Statement::Move { left, right } => {
                let command = DriveCommand::AutoMove { left: -left, right };
                self.caller.send(drive, Command::Drive(command)).await;
                self.status("move");
            }
            Statement::MeasuredMove(params) => {
                let result = self
                    .caller
                    .call(drive, Command::Drive(DriveCommand::MeasuredMove(params)))
                    .await;
                self.report(result, "move", "move error");
            }
            Statement::ProximityMove(params) => {
                let result = self
                    .caller
                    .call(drive, Command::Drive(DriveCommand::ProximityMove(params)))
                    .await;
                self.report(result, "move line", "move line error");
            }
            Statement::TimedMove { speed, time } => {
                let command = DriveCommand::TimedMove { speed, time };
                self.caller.send(drive, Command::Drive(command)).await;
                self.status("move");
            }
            Statement::Turn { angle, timeout } => {
                let result = self
                    .caller
                    .call(drive, Command::Drive(DriveCommand::Turn { angle, timeout }))
                    .await;
                self.report(result, "turn", "turn error");
            }
            Statement::ReleaseGear => {
                let command = GearCommand::Release(self.config.gear_speed);
                self.caller
                    .send(MailboxId::GearIntake, Command::Gear(command))
                    .await;
                self.status("gear release");
            }
            Statement::HoldGear => {
                let command = GearCommand::Hold(self.config.gear_speed);
                self.caller
                    .send(MailboxId::GearIntake, Command::Gear(command))
                    .await;
                self.status("gear hold");
            }
            Statement::HangGear => {
                self.caller
                    .send(
                        MailboxId::GearFloorIntake,
                        Command::Floor(FloorCommand::HangGear),
                    )
                    .await;
                Timer::after(self.config.hang_macro_settle).await;
                self.status("gear hang macro");
            }
            Statement::Climber => {
                let command = ClimberCommand::Pulse(self.config.climber_pulse_speed);
                self.caller
                    .send(MailboxId::Climber, Command::Climber(command))
                    .await;
                self.status("climber run");
            }
            Statement::Nop => {}
        }
        false
    }

    fn report(&self, result: Result<(), CallError>, ok: &str, failed: &str) {
        match result {
            Ok(()) => self.status(ok),
            Err(e) => {
                warn!("{STAMP} line {}: {e}", self.line_number);
                self.status(failed);
            }
        }
    }

    /// Sleeps in slices so a pause takes hold part way through. Paused time does not count.
    async fn delay(&self, total: Duration) {
        let slice = self.config.delay_slice;
        let mut waited = Duration::from_ticks(0);
        while waited < total {
            self.control.wait_while_paused(self.config.pause_poll).await;
            Timer::after(slice).await;
            waited += slice;
        }
    }
}

fn terminal_status(e: ParseError) -> &'static str {
    match e {
        ParseError::MissingToken => "missing token",
        _ => "no tokens - check script spelling",
    }
}

fn failure_status(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::Move | Keyword::MeasuredMove | Keyword::TimedMove => "move error",
        Keyword::ProximityMove => "move line error",
        Keyword::Turn => "turn error",
        _ => "missing parameter",
    }
}
