//! "Cheesy drive" steering filter.
//!
//! Mixes (steering, throttle, quickturn) intent into left/right voltages. Steering goes
//! through a sine remap, a negative-inertia term that resists sudden changes of direction, and
//! a quick-stop accumulator that bleeds off rotation built up while quickturning.
//!
//! The filter is fed on every drivetrain cycle, enabled or not, so its accumulators follow the
//! driver and there is no jump when output is enabled again. Positive steering turns right.
use core::f32::consts::PI;

#[allow(unused_imports)]
use micromath::F32Ext;

const DEADBAND: f32 = 0.02;
const TURN_NONLINEARITY: f32 = 0.65;
const NEG_INERTIA_SCALAR: f32 = 4.0;
const SENSITIVITY: f32 = 1.0;
const QUICK_STOP_THROTTLE: f32 = 0.2;
const QUICK_STOP_WEIGHT: f32 = 0.1;
const QUICK_STOP_SCALAR: f32 = 5.0;
const POSITION_FILTER: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveGoal {
    pub steering: f32,
    pub throttle: f32,
    pub quickturn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivePosition {
    /// Meters.
    pub left_encoder: f32,
    pub right_encoder: f32,
    /// Radians.
    pub gyro_angle: f32,
    pub gyro_velocity: f32,
    pub battery_voltage: f32,
}

impl Default for DrivePosition {
    fn default() -> Self {
        Self {
            left_encoder: 0.0,
            right_encoder: 0.0,
            gyro_angle: 0.0,
            gyro_velocity: 0.0,
            battery_voltage: crate::config::NOMINAL_BATTERY_VOLTAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveOutput {
    pub left_voltage: f32,
    pub right_voltage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveStatus {
    /// Meters per update, averaged over both sides.
    pub robot_speed: f32,
    pub filtered_left_position: f32,
    pub filtered_right_position: f32,
    pub uncapped_left_voltage: f32,
    pub uncapped_right_voltage: f32,
    pub output_was_capped: bool,
}

#[derive(Debug, Default)]
pub struct CheesyDrive {
    prev_steering: f32,
    neg_inertia_accumulator: f32,
    quick_stop_accumulator: f32,
    status: DriveStatus,
    primed: bool,
}

fn deadband(value: f32) -> f32 {
    if value.abs() < DEADBAND {
        0.0
    } else {
        value
    }
}

fn turn_remap(steering: f32) -> f32 {
    let denom = (PI / 2.0 * TURN_NONLINEARITY).sin();
    let first = (PI / 2.0 * TURN_NONLINEARITY * steering).sin() / denom;
    (PI / 2.0 * TURN_NONLINEARITY * first).sin() / denom
}

/// Moves an accumulator one unit toward zero, snapping to zero inside the unit band.
fn decay(accumulator: &mut f32) {
    if *accumulator > 1.0 {
        *accumulator -= 1.0;
    } else if *accumulator < -1.0 {
        *accumulator += 1.0;
    } else {
        *accumulator = 0.0;
    }
}

impl CheesyDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &DriveStatus {
        &self.status
    }

    pub fn update(&mut self, goal: &DriveGoal, position: &DrivePosition) -> DriveOutput {
        let steering = deadband(goal.steering.clamp(-1.0, 1.0));
        let throttle = deadband(goal.throttle.clamp(-1.0, 1.0));

        let neg_inertia = (steering - self.prev_steering) * NEG_INERTIA_SCALAR;
        self.prev_steering = steering;
        self.neg_inertia_accumulator += neg_inertia;
        let steer = turn_remap(steering) + self.neg_inertia_accumulator;
        decay(&mut self.neg_inertia_accumulator);

        let (angular, over_power) = if goal.quickturn {
            if throttle.abs() < QUICK_STOP_THROTTLE {
                self.quick_stop_accumulator = (1.0 - QUICK_STOP_WEIGHT) * self.quick_stop_accumulator
                    + QUICK_STOP_WEIGHT * steer.clamp(-1.0, 1.0) * QUICK_STOP_SCALAR;
            }
            (steer, 1.0)
        } else {
            let angular = throttle.abs() * steer * SENSITIVITY - self.quick_stop_accumulator;
            decay(&mut self.quick_stop_accumulator);
            (angular, 0.0)
        };

        let mut left = throttle + angular;
        let mut right = throttle - angular;

        if left > 1.0 {
            right -= over_power * (left - 1.0);
            left = 1.0;
        } else if right > 1.0 {
            left -= over_power * (right - 1.0);
            right = 1.0;
        } else if left < -1.0 {
            right += over_power * (-1.0 - left);
            left = -1.0;
        } else if right < -1.0 {
            left += over_power * (-1.0 - right);
            right = -1.0;
        }

        let battery = position.battery_voltage;
        let uncapped_left = left * battery;
        let uncapped_right = right * battery;
        let output = DriveOutput {
            left_voltage: uncapped_left.clamp(-battery, battery),
            right_voltage: uncapped_right.clamp(-battery, battery),
        };

        self.update_status(position, uncapped_left, uncapped_right, &output);
        output
    }

    fn update_status(
        &mut self,
        position: &DrivePosition,
        uncapped_left: f32,
        uncapped_right: f32,
        output: &DriveOutput,
    ) {
        let status = &mut self.status;
        if !self.primed {
            status.filtered_left_position = position.left_encoder;
            status.filtered_right_position = position.right_encoder;
            self.primed = true;
        }
        let left = status.filtered_left_position
            + POSITION_FILTER * (position.left_encoder - status.filtered_left_position);
        let right = status.filtered_right_position
            + POSITION_FILTER * (position.right_encoder - status.filtered_right_position);
        status.robot_speed = ((left - status.filtered_left_position)
            + (right - status.filtered_right_position))
            / 2.0;
        status.filtered_left_position = left;
        status.filtered_right_position = right;
        status.uncapped_left_voltage = uncapped_left;
        status.uncapped_right_voltage = uncapped_right;
        status.output_was_capped =
            uncapped_left != output.left_voltage || uncapped_right != output.right_voltage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(steering: f32, throttle: f32, quickturn: bool) -> DriveGoal {
        DriveGoal {
            steering,
            throttle,
            quickturn,
        }
    }

    #[test]
    fn straight_throttle_drives_both_sides_equally() {
        let mut cheesy = CheesyDrive::new();
        let out = cheesy.update(&goal(0.0, 0.5, false), &DrivePosition::default());
        assert!((out.left_voltage - 6.0).abs() < 1e-4);
        assert!((out.right_voltage - 6.0).abs() < 1e-4);
    }

    #[test]
    fn steering_without_throttle_does_nothing_unless_quickturning() {
        let mut cheesy = CheesyDrive::new();
        let position = DrivePosition::default();
        for _ in 0..5 {
            cheesy.update(&goal(0.5, 0.0, false), &position);
        }
        let out = cheesy.update(&goal(0.5, 0.0, false), &position);
        assert_eq!(out, DriveOutput::default());

        let mut cheesy = CheesyDrive::new();
        for _ in 0..5 {
            cheesy.update(&goal(0.5, 0.0, true), &position);
        }
        let out = cheesy.update(&goal(0.5, 0.0, true), &position);
        assert!(out.left_voltage > 0.0);
        assert!(out.right_voltage < 0.0);
        assert!((out.left_voltage + out.right_voltage).abs() < 1e-4);
    }

    #[test]
    fn positive_steering_turns_right_while_driving() {
        let mut cheesy = CheesyDrive::new();
        let position = DrivePosition::default();
        for _ in 0..5 {
            cheesy.update(&goal(0.3, 0.6, false), &position);
        }
        let out = cheesy.update(&goal(0.3, 0.6, false), &position);
        assert!(out.left_voltage > out.right_voltage);
    }

    #[test]
    fn quickturn_leaves_a_quick_stop_to_bleed_off() {
        let mut cheesy = CheesyDrive::new();
        let position = DrivePosition::default();
        for _ in 0..20 {
            cheesy.update(&goal(1.0, 0.0, true), &position);
        }
        assert!(cheesy.quick_stop_accumulator > 1.0);

        // releasing quickturn while driving straight counter-steers briefly
        let out = cheesy.update(&goal(0.0, 0.5, false), &position);
        assert!(out.left_voltage < out.right_voltage);
        for _ in 0..10 {
            cheesy.update(&goal(0.0, 0.5, false), &position);
        }
        assert_eq!(cheesy.quick_stop_accumulator, 0.0);
    }

    #[test]
    fn output_is_capped_at_battery_voltage() {
        let mut cheesy = CheesyDrive::new();
        let position = DrivePosition {
            battery_voltage: 11.0,
            ..DrivePosition::default()
        };
        let out = cheesy.update(&goal(1.0, 1.0, false), &position);
        assert!(out.left_voltage <= 11.0);
        assert!(out.right_voltage >= -11.0);
        assert!(cheesy.status().output_was_capped);
    }

    #[test]
    fn status_follows_the_encoders() {
        let mut cheesy = CheesyDrive::new();
        let mut position = DrivePosition::default();
        cheesy.update(&DriveGoal::default(), &position);
        position.left_encoder = 1.0;
        position.right_encoder = 1.0;
        cheesy.update(&DriveGoal::default(), &position);
        assert!((cheesy.status().filtered_left_position - 0.5).abs() < 1e-6);
        assert!((cheesy.status().robot_speed - 0.5).abs() < 1e-6);
    }
}
