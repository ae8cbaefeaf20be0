//! Robot-wide constants and tunables.
//!
//! Everything that is fixed for a season lives here as a `const`. Values that tests
//! need to vary are grouped in small `Default`-able structs owned by the task that uses them.
use embassy_time::Duration;

// ROBOT IDENTITY
pub const ROBOT_NAME: &str = "RhsRobot2017";
pub const ROBOT_NICKNAME: &str = "Unknown";
pub const ROBOT_VERSION: &str = "0.5";

// SCRIPT
/// Scripts longer than this are rejected at load time.
pub const SCRIPT_CAPACITY: usize = 150;
pub const SCRIPT_LINE_CAPACITY: usize = 160;
pub const SCRIPT_PATH: &str = "/home/lvuser/RhsScript.txt";
/// Largest magnitude accepted by the raw `MOVE` keyword.
pub const MAX_VELOCITY_PARAM: f32 = 1.0;

// MESSAGING
pub const MAILBOX_DEPTH: usize = 8;

// DRIVETRAIN
pub const FULLSPEED_FROMTALONS: f32 = 1422.22; // measured on the robot in RPMs
pub const TALON_COUNTSPERREV: f32 = 360.0;
pub const WHEEL_DIAMETER_INCHES: f32 = 6.0;
pub const TURN_DEAD_BAND_DEGREES: f32 = 1.0;
pub const MINIMUM_TURN_SPEED: f32 = 0.25;
pub const HEADING_CORRECTION_DIVISOR: f32 = 45.0;
pub const NOMINAL_BATTERY_VOLTAGE: f32 = 12.0;

// SAFETY
pub const MAX_MOTOR_CURRENT_AMPS: f32 = 40.0;
/// Components sample motor currents once every this many cycles.
pub const SAFETY_CHECK_INTERVAL: u32 = 10;
/// How long a component waits on its mailbox before running a quiet cycle.
pub const COMPONENT_CYCLE: Duration = Duration::from_millis(20);

/// Script and message parameters are seconds as `f32`; negative values mean no time at all.
pub fn seconds(secs: f32) -> Duration {
    Duration::from_micros((secs.max(0.0) * 1_000_000.0) as u64)
}

/// Drivetrain loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct DriveConfig {
    pub counts_per_rev: f32,
    pub wheel_diameter_inches: f32,
    pub full_speed: f32,
    /// Inches the robot coasts after the motors stop, per unit of speed. Measured targets are
    /// shortened by this much.
    pub coast_inches_per_speed: f32,
    pub heading_divisor: f32,
    pub turn_dead_band: f32,
    pub minimum_turn_speed: f32,
    pub iterate_period: Duration,
    pub cycle: Duration,
    /// Attempts made to zero the encoder before a measured move.
    pub zero_attempts: u8,
    /// Time the range finder gets to settle before a proximity move samples it.
    pub range_settle: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            counts_per_rev: TALON_COUNTSPERREV,
            wheel_diameter_inches: WHEEL_DIAMETER_INCHES,
            full_speed: FULLSPEED_FROMTALONS,
            coast_inches_per_speed: 0.0,
            heading_divisor: HEADING_CORRECTION_DIVISOR,
            turn_dead_band: TURN_DEAD_BAND_DEGREES,
            minimum_turn_speed: MINIMUM_TURN_SPEED,
            iterate_period: Duration::from_millis(5),
            cycle: COMPONENT_CYCLE,
            zero_attempts: 20,
            range_settle: Duration::from_millis(500),
        }
    }
}

/// How the interpreter resolves the first token of a line against the keyword table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordMatch {
    /// The token must equal a keyword.
    Exact,
    /// The first keyword that is a prefix of the token wins (legacy scripts).
    Prefix,
}

/// Autonomous sequencer and interpreter tuning.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfig {
    /// Upper bound on a synchronous call. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    pub pause_poll: Duration,
    pub delay_slice: Duration,
    pub hang_macro_settle: Duration,
    pub keyword_match: KeywordMatch,
    pub climber_pulse_speed: f32,
    pub gear_speed: f32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Some(Duration::from_secs(15)),
            pause_poll: Duration::from_millis(20),
            delay_slice: Duration::from_millis(10),
            hang_macro_settle: Duration::from_secs(1),
            keyword_match: KeywordMatch::Exact,
            climber_pulse_speed: 1.0,
            gear_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClimberConfig {
    pub max_current: f32,
    pub pulse_time: Duration,
    pub pulse_period: Duration,
    pub cycle: Duration,
}

impl Default for ClimberConfig {
    fn default() -> Self {
        Self {
            max_current: MAX_MOTOR_CURRENT_AMPS,
            pulse_time: Duration::from_millis(500),
            pulse_period: Duration::from_millis(5),
            cycle: COMPONENT_CYCLE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GearIntakeConfig {
    pub max_current: f32,
    /// How long the motor runs before an opening or closing gripper counts as settled.
    pub transition_time: Duration,
    /// Output held against a closed gripper to keep tension on the gear.
    pub hold_tension: f32,
    pub cycle: Duration,
}

impl Default for GearIntakeConfig {
    fn default() -> Self {
        Self {
            max_current: MAX_MOTOR_CURRENT_AMPS,
            transition_time: Duration::from_millis(300),
            hold_tension: 0.1,
            cycle: COMPONENT_CYCLE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArmConfig {
    /// Arm offsets from the zeroed drive position, in rotations.
    pub floor_offset: f32,
    pub release_offset: f32,
    pub max_intake_speed: f32,
    pub max_arm_current: f32,
    pub counts_per_rotation: f32,
    pub macro_roller_speed: f32,
    pub macro_roller_time: Duration,
    pub macro_floor_time: Duration,
    pub macro_release_time: Duration,
    pub cycle: Duration,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            floor_offset: 1.6195,
            release_offset: 0.5885,
            max_intake_speed: 1.0,
            max_arm_current: MAX_MOTOR_CURRENT_AMPS,
            counts_per_rotation: 4096.0,
            macro_roller_speed: 0.4,
            macro_roller_time: Duration::from_millis(200),
            macro_floor_time: Duration::from_millis(400),
            macro_release_time: Duration::from_millis(100),
            cycle: COMPONENT_CYCLE,
        }
    }
}
