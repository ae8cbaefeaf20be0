//! Software robot.
//!
//! Stand-ins for every hardware trait so the subsystem tasks run unchanged on a host. The
//! drivetrain pieces share one [`SimChassis`], a two-wheel model integrated lazily whenever a
//! handle touches it. Everything else is backed by a [`Probe`] or [`MotorProbe`] that tests
//! keep a reference to while the task owns the device.
use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;
use heapless::{String, Vec};

use crate::config::FULLSPEED_FROMTALONS;
use crate::robot::hardware::{ControlMode, Gyro, LimitSwitch, Motor, QuadEncoder, RangeFinder};
use crate::robot::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Chassis response at full output.
#[derive(Debug, Clone, Copy)]
pub struct ChassisConfig {
    pub counts_per_second: f32,
    /// Spin rate when the sides run at full output in opposite directions, halved.
    pub degrees_per_second: f32,
    /// Velocity setpoint that means full output.
    pub full_speed: f32,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            counts_per_second: 2000.0,
            degrees_per_second: 180.0,
            full_speed: FULLSPEED_FROMTALONS,
        }
    }
}

#[derive(Debug)]
struct ChassisState {
    command: [f32; 2],
    mode: [ControlMode; 2],
    counts: [f32; 2],
    heading: f32,
    heading_zero: f32,
    rate: f32,
    last: Option<Instant>,
}

impl ChassisState {
    const fn new() -> Self {
        Self {
            command: [0.0; 2],
            mode: [ControlMode::PercentOutput; 2],
            counts: [0.0; 2],
            heading: 0.0,
            heading_zero: 0.0,
            rate: 0.0,
            last: None,
        }
    }

    fn fraction(&self, side: Side, config: &ChassisConfig) -> f32 {
        let i = side.index();
        let value = match self.mode[i] {
            ControlMode::Velocity => self.command[i] / config.full_speed,
            _ => self.command[i],
        };
        value.clamp(-1.0, 1.0)
    }

    fn advance(&mut self, config: &ChassisConfig, now: Instant) {
        let Some(last) = self.last.replace(now) else {
            return;
        };
        let dt = now.saturating_duration_since(last).as_micros() as f32 / 1_000_000.0;

        // left motor is mounted reversed
        let left = -self.fraction(Side::Left, config);
        let right = self.fraction(Side::Right, config);

        self.counts[0] += left * config.counts_per_second * dt;
        self.counts[1] += right * config.counts_per_second * dt;
        self.rate = (left - right) * config.degrees_per_second;
        self.heading += self.rate * dt;
    }
}

/// Two motors, two encoders and a gyro bolted to one frame.
pub struct SimChassis {
    config: ChassisConfig,
    state: Mutex<CriticalSectionRawMutex, RefCell<ChassisState>>,
}

impl Default for SimChassis {
    fn default() -> Self {
        Self::new(ChassisConfig::default())
    }
}

impl SimChassis {
    pub const fn new(config: ChassisConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RefCell::new(ChassisState::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChassisState) -> R) -> R {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.advance(&self.config, Instant::now());
            f(&mut state)
        })
    }

    pub fn motor(&self, side: Side) -> ChassisMotor<'_> {
        ChassisMotor {
            chassis: self,
            side,
        }
    }

    pub fn encoder(&self, side: Side) -> ChassisEncoder<'_> {
        ChassisEncoder {
            chassis: self,
            side,
        }
    }

    pub fn gyro(&self) -> SimGyro<'_> {
        SimGyro { chassis: self }
    }

    /// Heading since power-on, ignoring gyro zeroing.
    pub fn heading(&self) -> f32 {
        self.with(|s| s.heading)
    }

    /// Distance each side has rolled forward, in encoder counts.
    pub fn travelled(&self, side: Side) -> f32 {
        self.with(|s| s.counts[side.index()])
    }

    pub fn output(&self, side: Side) -> f32 {
        self.with(|s| s.command[side.index()])
    }

    pub fn control_mode(&self, side: Side) -> ControlMode {
        self.with(|s| s.mode[side.index()])
    }
}

pub struct ChassisMotor<'a> {
    chassis: &'a SimChassis,
    side: Side,
}

impl Motor for ChassisMotor<'_> {
    fn set(&mut self, value: f32) {
        let i = self.side.index();
        self.chassis.with(|s| s.command[i] = value);
    }

    fn set_control_mode(&mut self, mode: ControlMode) {
        let i = self.side.index();
        self.chassis.with(|s| s.mode[i] = mode);
    }

    fn control_mode(&self) -> ControlMode {
        self.chassis.control_mode(self.side)
    }

    fn get(&self) -> f32 {
        self.chassis.output(self.side)
    }
}

/// Reads counts in the motor's own direction, so the left side counts down going forward.
pub struct ChassisEncoder<'a> {
    chassis: &'a SimChassis,
    side: Side,
}

impl QuadEncoder for ChassisEncoder<'_> {
    fn position(&self) -> i32 {
        let i = self.side.index();
        let counts = self.chassis.with(|s| s.counts[i]);
        match self.side {
            Side::Left => -counts as i32,
            Side::Right => counts as i32,
        }
    }

    fn set_position(&mut self, counts: i32) {
        let i = self.side.index();
        let counts = match self.side {
            Side::Left => -counts as f32,
            Side::Right => counts as f32,
        };
        self.chassis.with(|s| s.counts[i] = counts);
    }
}

pub struct SimGyro<'a> {
    chassis: &'a SimChassis,
}

impl Gyro for SimGyro<'_> {
    fn angle(&self) -> f32 {
        self.chassis.with(|s| s.heading - s.heading_zero)
    }

    fn rate(&self) -> f32 {
        self.chassis.with(|s| s.rate)
    }

    fn zero(&mut self) {
        self.chassis.with(|s| s.heading_zero = s.heading);
    }
}

/// A value shared between a simulated device and the test poking at it.
pub struct Probe<T> {
    value: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: Copy> Probe<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.value.lock(|v| v.get())
    }

    pub fn set(&self, value: T) {
        self.value.lock(|v| v.set(value));
    }
}

impl Probe<f32> {
    pub fn ranger(&self) -> SimRanger<'_> {
        SimRanger { probe: self }
    }
}

impl Probe<bool> {
    pub fn switch(&self) -> SimSwitch<'_> {
        SimSwitch { probe: self }
    }
}

impl Probe<i32> {
    pub fn encoder(&self) -> SimEncoder<'_> {
        SimEncoder { probe: self }
    }
}

pub struct SimRanger<'a> {
    probe: &'a Probe<f32>,
}

impl RangeFinder for SimRanger<'_> {
    fn range_inches(&mut self) -> f32 {
        self.probe.get()
    }
}

pub struct SimSwitch<'a> {
    probe: &'a Probe<bool>,
}

impl LimitSwitch for SimSwitch<'_> {
    fn is_closed(&self) -> bool {
        self.probe.get()
    }
}

pub struct SimEncoder<'a> {
    probe: &'a Probe<i32>,
}

impl QuadEncoder for SimEncoder<'_> {
    fn position(&self) -> i32 {
        self.probe.get()
    }

    fn set_position(&mut self, counts: i32) {
        self.probe.set(counts);
    }
}

#[derive(Debug, Clone, Copy)]
struct MotorState {
    value: f32,
    mode: ControlMode,
    current: f32,
    writes: u32,
}

/// Backing store for a standalone [`SimMotor`]. The current draw is whatever the test sets.
pub struct MotorProbe {
    state: Mutex<CriticalSectionRawMutex, Cell<MotorState>>,
}

impl Default for MotorProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorProbe {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(MotorState {
                value: 0.0,
                mode: ControlMode::PercentOutput,
                current: 0.0,
                writes: 0,
            })),
        }
    }

    fn update(&self, f: impl FnOnce(&mut MotorState)) {
        self.state.lock(|cell| {
            let mut state = cell.get();
            f(&mut state);
            cell.set(state);
        });
    }

    fn read(&self) -> MotorState {
        self.state.lock(|cell| cell.get())
    }

    pub fn motor(&self) -> SimMotor<'_> {
        SimMotor { probe: self }
    }

    pub fn value(&self) -> f32 {
        self.read().value
    }

    pub fn mode(&self) -> ControlMode {
        self.read().mode
    }

    pub fn writes(&self) -> u32 {
        self.read().writes
    }

    pub fn set_current(&self, amps: f32) {
        self.update(|s| s.current = amps);
    }
}

pub struct SimMotor<'a> {
    probe: &'a MotorProbe,
}

impl Motor for SimMotor<'_> {
    fn set(&mut self, value: f32) {
        self.probe.update(|s| {
            s.value = value;
            s.writes += 1;
        });
    }

    fn set_control_mode(&mut self, mode: ControlMode) {
        self.probe.update(|s| s.mode = mode);
    }

    fn control_mode(&self) -> ControlMode {
        self.probe.mode()
    }

    fn get(&self) -> f32 {
        self.probe.value()
    }

    fn output_current(&self) -> f32 {
        self.probe.read().current
    }
}

const RECORD_DEPTH: usize = 64;
pub type Key = String<24>;
pub type Text = String<40>;

fn truncated<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Keeps the most recent dashboard strings so tests can check what the operator saw.
pub struct RecordingTelemetry {
    strings: Mutex<CriticalSectionRawMutex, RefCell<Vec<(Key, Text), RECORD_DEPTH>>>,
    numbers: Mutex<CriticalSectionRawMutex, Cell<usize>>,
}

impl Default for RecordingTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTelemetry {
    pub const fn new() -> Self {
        Self {
            strings: Mutex::new(RefCell::new(Vec::new())),
            numbers: Mutex::new(Cell::new(0)),
        }
    }

    /// Latest value written under `key`.
    pub fn last(&self, key: &str) -> Option<Text> {
        self.strings.lock(|strings| {
            strings
                .borrow()
                .iter()
                .rev()
                .find(|(k, _)| k.as_str() == key)
                .map(|(_, v)| v.clone())
        })
    }

    /// Whether `value` was ever written under `key`, as long as it has not aged out.
    pub fn saw(&self, key: &str, value: &str) -> bool {
        self.strings.lock(|strings| {
            strings
                .borrow()
                .iter()
                .any(|(k, v)| k.as_str() == key && v.as_str() == value)
        })
    }

    pub fn numbers_written(&self) -> usize {
        self.numbers.lock(|n| n.get())
    }
}

impl Telemetry for RecordingTelemetry {
    fn put_string(&self, key: &str, value: &str) {
        self.strings.lock(|strings| {
            let mut strings = strings.borrow_mut();
            if strings.is_full() {
                strings.remove(0);
            }
            let _ = strings.push((truncated(key), truncated(value)));
        });
    }

    fn put_number(&self, _key: &str, _value: f32) {
        self.numbers.lock(|n| n.set(n.get() + 1));
    }

    fn put_bool(&self, key: &str, value: bool) {
        self.put_string(key, if value { "true" } else { "false" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_time::{Duration, Timer};

    #[test]
    fn chassis_rolls_forward_with_the_left_motor_reversed() {
        let chassis = SimChassis::default();
        let mut left = chassis.motor(Side::Left);
        let mut right = chassis.motor(Side::Right);
        left.set(-0.5);
        right.set(0.5);
        block_on(Timer::after(Duration::from_millis(100)));
        left.set(0.0);
        right.set(0.0);

        let rolled = chassis.travelled(Side::Right);
        assert!(rolled > 50.0, "rolled {rolled}");
        assert!((chassis.travelled(Side::Left) - rolled).abs() < 1.0);
        assert!(chassis.heading().abs() < 0.01);
        assert_eq!(chassis.encoder(Side::Left).position(), -(chassis.travelled(Side::Left) as i32));
    }

    #[test]
    fn same_sign_on_both_motors_spins_in_place() {
        let chassis = SimChassis::default();
        let mut gyro = chassis.gyro();
        chassis.motor(Side::Left).set(-0.1);
        chassis.motor(Side::Right).set(-0.1);
        block_on(Timer::after(Duration::from_millis(50)));
        chassis.motor(Side::Left).set(0.0);
        chassis.motor(Side::Right).set(0.0);

        assert!(gyro.angle() > 0.0);
        assert!(chassis.travelled(Side::Right) < 0.0);
        gyro.zero();
        assert_eq!(gyro.angle(), 0.0);
    }

    #[test]
    fn velocity_setpoints_are_read_against_full_speed() {
        let chassis = SimChassis::default();
        let mut right = chassis.motor(Side::Right);
        right.set_control_mode(ControlMode::Velocity);
        right.set(FULLSPEED_FROMTALONS / 2.0);
        let fraction = chassis.with(|s| s.fraction(Side::Right, &chassis.config));
        assert!((fraction - 0.5).abs() < 1e-6);
    }

    #[test]
    fn telemetry_remembers_the_latest_string() {
        let telemetry = RecordingTelemetry::new();
        telemetry.put_string("Auto Status", "auto ok");
        telemetry.put_string("Auto Status", "EARLY DEATH!");
        telemetry.put_number("angle", 1.0);
        assert_eq!(telemetry.last("Auto Status").as_deref(), Some("EARLY DEATH!"));
        assert!(telemetry.saw("Auto Status", "auto ok"));
        assert_eq!(telemetry.numbers_written(), 1);
        assert!(telemetry.last("missing").is_none());
    }

    #[test]
    fn probes_back_their_devices() {
        let range = Probe::new(48.0_f32);
        let gear = Probe::new(false);
        let motor = MotorProbe::new();
        let mut m = motor.motor();
        m.set(0.3);
        motor.set_current(12.0);
        gear.set(true);

        assert_eq!(range.ranger().range_inches(), 48.0);
        assert!(gear.switch().is_closed());
        assert_eq!(m.get(), 0.3);
        assert_eq!(m.output_current(), 12.0);
        assert_eq!(motor.writes(), 1);
    }
}
