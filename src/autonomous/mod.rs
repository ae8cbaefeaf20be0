//! The scripted autonomous pipeline.
//!
//! - [`script`]: bounded script storage and the sources scripts load from.
//! - [`parser`]: tokenizer, keyword table and parsed statements.
//! - [`protocol`]: synchronous and multi-target calls into the subsystem tasks.
//! - [`control`]: externally flipped pause and debug switches.
//! - [`interpreter`]: runs one line.
//! - [`sequencer`]: runs a whole script.
pub mod control;
pub mod interpreter;
pub mod parser;
pub mod protocol;
pub mod script;
pub mod sequencer;

pub use control::AutoControl;
pub use interpreter::Interpreter;
pub use protocol::{CallError, Caller};
pub use script::{Script, ScriptError, ScriptSource, TextScript};
pub use sequencer::{RunEnd, Sequencer, SequencerState};

#[cfg(feature = "std")]
pub use script::FileScript;
