//! Pause and debug switches flipped from outside the autonomous task.
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};
use log::info;

pub struct AutoControl {
    paused: AtomicBool,
    debug: AtomicBool,
    resumed: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for AutoControl {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoControl {
    pub const fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            debug: AtomicBool::new(false),
            resumed: Signal::new(),
        }
    }

    pub fn pause(&self) {
        self.resumed.reset();
        self.paused.store(true, Ordering::Release);
        info!("[AUTO] paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resumed.signal(());
        info!("[AUTO] resumed");
    }

    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Returns once the sequencer is not paused. Wakes on [`AutoControl::resume`], and re-checks
    /// at least every `poll` in case the signal was missed.
    pub async fn wait_while_paused(&self, poll: Duration) {
        while self.is_paused() {
            let _ = with_timeout(poll, self.resumed.wait()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::{Instant, Timer};

    #[test]
    fn toggles() {
        let control = AutoControl::new();
        assert!(!control.is_paused());
        control.toggle_pause();
        assert!(control.is_paused());
        control.toggle_pause();
        assert!(!control.is_paused());

        control.set_debug(true);
        assert!(control.debug());
    }

    #[test]
    fn waiting_returns_immediately_when_running() {
        let control = AutoControl::new();
        let start = Instant::now();
        block_on(control.wait_while_paused(Duration::from_secs(1)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn waiting_blocks_until_resumed() {
        let control = AutoControl::new();
        control.pause();
        let start = Instant::now();
        block_on(join(control.wait_while_paused(Duration::from_millis(500)), async {
            Timer::after_millis(50).await;
            control.resume();
        }));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(400));
    }
}
