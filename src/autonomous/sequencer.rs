//! Walks a loaded script line by line through the [`Interpreter`].
//!
//! ```text
//! Idle -> Loading -> Running <-> Paused
//!                       |
//!                       v
//!                  Terminated
//! ```
//!
//! A failed load falls back to `Idle`. `Terminated` only leaves through another load.
use core::cell::Cell;

use log::{error, info};

use super::control::AutoControl;
use super::interpreter::Interpreter;
use super::parser::is_skippable;
use super::script::{Script, ScriptError, ScriptSource};
use crate::robot::state::ModeFlag;

const STAMP: &str = "[AUTO]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Loading,
    Running,
    Paused,
    Terminated,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The interpreter asked to stop (`END` or a bad keyword).
    Terminated,
    /// Every line ran.
    Exhausted,
    /// The robot left autonomous between two lines.
    LeftAuto,
}

pub struct Sequencer<'a> {
    control: &'a AutoControl,
    script: Script,
    state: Cell<SequencerState>,
}

impl<'a> Sequencer<'a> {
    pub fn new(control: &'a AutoControl) -> Self {
        Self {
            control,
            script: Script::new(),
            state: Cell::new(SequencerState::Idle),
        }
    }

    pub fn state(&self) -> SequencerState {
        match self.state.get() {
            SequencerState::Running if self.control.is_paused() => SequencerState::Paused,
            state => state,
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Replaces the script. On failure the old script is gone too and the sequencer is idle.
    pub fn load(&mut self, source: &dyn ScriptSource) -> Result<usize, ScriptError> {
        self.state.set(SequencerState::Loading);
        match source.load() {
            Ok(script) => {
                self.script = script;
                info!("{STAMP} loaded {} lines", self.script.len());
                Ok(self.script.len())
            }
            Err(e) => {
                self.script = Script::new();
                self.state.set(SequencerState::Idle);
                error!("{STAMP} load failed: {e}");
                Err(e)
            }
        }
    }

    /// Runs the loaded script to its end. Blank and comment lines are passed over.
    pub async fn run(
        &self,
        interpreter: &mut Interpreter<'_>,
        mode: &ModeFlag,
    ) -> Result<RunEnd, ScriptError> {
        if self.state.get() != SequencerState::Loading {
            return Err(ScriptError::NotLoaded);
        }
        self.state.set(SequencerState::Running);
        interpreter.restart();

        let mut end = RunEnd::Exhausted;
        for (index, line) in self.script.lines().enumerate() {
            if !mode.in_auto() {
                info!("{STAMP} left autonomous before line {}", index + 1);
                end = RunEnd::LeftAuto;
                break;
            }
            if is_skippable(line) {
                continue;
            }
            interpreter.set_line_number(index + 1);
            if interpreter.evaluate(line).await {
                end = RunEnd::Terminated;
                break;
            }
        }

        self.state.set(SequencerState::Terminated);
        info!(
            "{STAMP} {end:?} after {} commands",
            interpreter.dispatched()
        );
        Ok(end)
    }
}
