//! Robot mode shared across task boundaries.
//!
//! The dispatcher is the only writer. Motion loops read it between iterations to notice that
//! autonomous has ended, which is the only way an in-flight move gets cancelled.
use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::commands::RobotMode;

pub struct ModeFlag {
    mode: Mutex<CriticalSectionRawMutex, Cell<RobotMode>>,
}

impl Default for ModeFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeFlag {
    pub const fn new() -> Self {
        Self {
            mode: Mutex::new(Cell::new(RobotMode::Unknown)),
        }
    }

    pub fn set(&self, mode: RobotMode) {
        self.mode.lock(|cell| cell.set(mode));
    }

    pub fn get(&self) -> RobotMode {
        self.mode.lock(|cell| cell.get())
    }

    pub fn in_auto(&self) -> bool {
        self.get() == RobotMode::Autonomous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown_and_tracks_writes() {
        let flag = ModeFlag::new();
        assert_eq!(flag.get(), RobotMode::Unknown);
        assert!(!flag.in_auto());
        flag.set(RobotMode::Autonomous);
        assert!(flag.in_auto());
        flag.set(RobotMode::Disabled);
        assert!(!flag.in_auto());
    }
}
