//! Autonomous task: loads the script and runs it whenever the robot enters autonomous.
//!
//! The whole script runs inside one cycle of this task. Leaving autonomous is noticed by the
//! sequencer between lines and by the drivetrain inside its motion loops.
use embassy_time::Duration;
use log::{error, info};

use crate::autonomous::protocol::STATUS_KEY;
use crate::autonomous::{AutoControl, Caller, Interpreter, ScriptSource, Sequencer, SequencerState};
use crate::config::{AutoConfig, COMPONENT_CYCLE};
use crate::robot::commands::{AutoCommand, Command, Reply, RobotMessage, RobotMode};
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[AUTONOMOUS]";

pub struct Autonomous<'a, S> {
    source: S,
    sequencer: Sequencer<'a>,
    interpreter: Interpreter<'a>,
    runs: u32,
}

impl<'a, S: ScriptSource> Autonomous<'a, S> {
    pub fn new(source: S, caller: Caller<'a>, control: &'a AutoControl, config: AutoConfig) -> Self {
        Self {
            source,
            sequencer: Sequencer::new(control),
            interpreter: Interpreter::new(caller, control, config),
            runs: 0,
        }
    }

    pub fn sequencer(&self) -> &Sequencer<'a> {
        &self.sequencer
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    async fn run_script(&mut self, ctx: &Context<'_>) {
        match self.sequencer.load(&self.source) {
            Ok(lines) => info!("{STAMP} script ready, {lines} lines"),
            Err(e) => {
                ctx.telemetry.put_string(STATUS_KEY, "no script");
                error!("{STAMP} not running: {e}");
                return;
            }
        }

        self.runs += 1;
        match self.sequencer.run(&mut self.interpreter, ctx.mode).await {
            Ok(end) => {
                info!("{STAMP} run {} ended: {end:?}", self.runs);
                ctx.telemetry
                    .put_number("Auto Commands", self.interpreter.dispatched() as f32);
            }
            Err(e) => error!("{STAMP} {e}"),
        }
    }
}

fn state_label(state: SequencerState) -> &'static str {
    match state {
        SequencerState::Idle => "idle",
        SequencerState::Loading => "loading",
        SequencerState::Running => "running",
        SequencerState::Paused => "paused",
        SequencerState::Terminated => "terminated",
    }
}

impl<S: ScriptSource> Component for Autonomous<'_, S> {
    const ID: MailboxId = MailboxId::Autonomous;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        COMPONENT_CYCLE
    }

    async fn on_state_change(&mut self, mode: RobotMode, ctx: &Context<'_>) {
        if mode == RobotMode::Autonomous {
            self.run_script(ctx).await;
        }
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        ctx.telemetry
            .put_string("Auto State", state_label(self.sequencer.state()));
        false
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply {
        if message.command == Command::Auto(AutoCommand::Run) {
            // Restart on request, e.g. after fixing the script between matches
            self.run_script(ctx).await;
        }
        Reply::Ok
    }
}
