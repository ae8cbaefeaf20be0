//! Hardware seams consumed by the subsystem tasks.
//!
//! Motor controllers, encoders, the gyro and the other sensors sit behind these small traits so
//! each subsystem owns its devices without caring which driver is underneath.
use embedded_hal::pwm::SetDutyCycle;
use fugit::HertzU32;
use log::error;

/// How a motor interprets the value passed to [`Motor::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Fraction of bus voltage, -1.0..=1.0.
    PercentOutput,
    /// Closed-loop speed in the controller's native units.
    Velocity,
    /// Closed-loop position in rotations.
    Position,
}

pub trait Motor {
    fn set(&mut self, value: f32);

    fn set_control_mode(&mut self, _mode: ControlMode) {}

    fn control_mode(&self) -> ControlMode {
        ControlMode::PercentOutput
    }

    /// Last value written with [`Motor::set`].
    fn get(&self) -> f32;

    /// Amps drawn, when the controller can measure it.
    fn output_current(&self) -> f32 {
        0.0
    }

    fn clear_error(&mut self) {}

    fn stop_motor(&mut self) {
        self.set(0.0);
    }
}

pub trait QuadEncoder {
    fn position(&self) -> i32;
    fn set_position(&mut self, counts: i32);
}

pub trait Gyro {
    /// Heading in degrees since the last [`Gyro::zero`].
    fn angle(&self) -> f32;
    /// Degrees per second.
    fn rate(&self) -> f32;
    fn zero(&mut self);
}

pub trait RangeFinder {
    fn range_inches(&mut self) -> f32;
}

pub trait LimitSwitch {
    fn is_closed(&self) -> bool;
}

// Pulse widths understood by PWM speed controllers.
const REVERSE_PULSE_US: u32 = 1000;
const NEUTRAL_PULSE_US: u32 = 1500;
const FORWARD_PULSE_US: u32 = 2000;

/// A speed controller driven by a hobby-style PWM pulse, 1.0 ms full reverse to 2.0 ms full
/// forward with 1.5 ms neutral.
#[derive(Debug)]
pub struct PwmMotor<PWM> {
    pwm: PWM,
    value: f32,
    max_duty: u32,
    frequency: HertzU32,
    inverted: bool,
}

impl<PWM> PwmMotor<PWM>
where
    PWM: SetDutyCycle,
{
    pub fn new(pwm: PWM, frequency: HertzU32) -> Self {
        let max_duty = pwm.max_duty_cycle() as u32;
        let mut motor = Self {
            pwm,
            value: f32::NAN,
            max_duty,
            frequency,
            inverted: false,
        };
        motor.set(0.0);
        motor
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    /// Duty cycle ticks for a percent output.
    fn duty_for(&self, value: f32) -> u16 {
        let value = if self.inverted { -value } else { value };
        let span = (FORWARD_PULSE_US - REVERSE_PULSE_US) as f32 / 2.0;
        let pulse = (NEUTRAL_PULSE_US as f32 + value * span) as u32;

        // THE WIDTH OF THE PULSE DRIVES THE SPEED, NOT THE FREQUENCY
        let period_us = 1_000_000 / self.frequency.raw();
        ((pulse * self.max_duty) / period_us).min(self.max_duty) as u16
    }

    pub fn release(self) -> PWM {
        self.pwm
    }
}

impl<PWM> Motor for PwmMotor<PWM>
where
    PWM: SetDutyCycle,
{
    fn set(&mut self, value: f32) {
        let value = value.clamp(-1.0, 1.0);

        // Avoid rewriting the same output
        if self.value == value {
            return;
        }
        self.value = value;

        let duty = self.duty_for(value);
        if let Err(e) = self.pwm.set_duty_cycle(duty) {
            error!("[PWM] Error writing output {value} {:?}", e);
        }
    }

    fn get(&self) -> f32 {
        self.value
    }
}
