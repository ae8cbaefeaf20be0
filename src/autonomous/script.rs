//! Script storage and where scripts come from.
//!
//! A script is every line of the file in order, comments and blanks included, so line numbers
//! in log output match the file. Both the line count and the line length are bounded; going
//! over either rejects the whole script at load time.
use core::fmt::{self, Display, Formatter};

use heapless::{String, Vec};

use crate::config::{SCRIPT_CAPACITY, SCRIPT_LINE_CAPACITY};

pub type Line = String<SCRIPT_LINE_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    /// Nothing at the script location.
    Missing,
    Unreadable,
    TooManyLines { capacity: usize },
    /// 1-based number of the offending line.
    LineTooLong { line: usize },
    /// A run was requested without a freshly loaded script.
    NotLoaded,
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Missing => f.write_str("script not found"),
            ScriptError::Unreadable => f.write_str("script could not be read"),
            ScriptError::TooManyLines { capacity } => {
                write!(f, "script is longer than {capacity} lines")
            }
            ScriptError::LineTooLong { line } => {
                write!(f, "line {line} is longer than {SCRIPT_LINE_CAPACITY} bytes")
            }
            ScriptError::NotLoaded => f.write_str("no script loaded"),
        }
    }
}

impl core::error::Error for ScriptError {}

#[derive(Debug, Default, Clone)]
pub struct Script {
    lines: Vec<Line, SCRIPT_CAPACITY>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut script = Script::new();
        for line in text.lines() {
            script.push_line(line)?;
        }
        Ok(script)
    }

    pub fn push_line(&mut self, text: &str) -> Result<(), ScriptError> {
        let number = self.lines.len() + 1;
        let line = Line::try_from(text).map_err(|_| ScriptError::LineTooLong { line: number })?;
        self.lines
            .push(line)
            .map_err(|_| ScriptError::TooManyLines {
                capacity: SCRIPT_CAPACITY,
            })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|line| line.as_str())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.as_str())
    }
}

/// Anything a script can be loaded from.
pub trait ScriptSource {
    fn load(&self) -> Result<Script, ScriptError>;
}

/// A script held in memory, e.g. one baked in with `include_str!`.
#[derive(Debug, Clone, Copy)]
pub struct TextScript<'a>(pub &'a str);

impl ScriptSource for TextScript<'_> {
    fn load(&self) -> Result<Script, ScriptError> {
        Script::parse(self.0)
    }
}

#[cfg(feature = "std")]
pub use file::FileScript;

#[cfg(feature = "std")]
mod file {
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use log::error;

    use super::{Script, ScriptError, ScriptSource};

    /// A script read from disk every time it is loaded, so edits take effect on the next run.
    #[derive(Debug, Clone)]
    pub struct FileScript {
        path: PathBuf,
    }

    impl FileScript {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl ScriptSource for FileScript {
        fn load(&self) -> Result<Script, ScriptError> {
            let text = std::fs::read_to_string(&self.path).map_err(|e| {
                error!("[AUTO] {}: {e}", self.path.display());
                match e.kind() {
                    ErrorKind::NotFound => ScriptError::Missing,
                    _ => ScriptError::Unreadable,
                }
            })?;
            Script::parse(&text)
        }
    }
}
