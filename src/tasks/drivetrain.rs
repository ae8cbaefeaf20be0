//! Drivetrain task.
//!
//! Owns both drive motors, the encoders, the gyro and the range finder. Manual commands set
//! the motors directly or go through the cheesy filter. Measured moves, proximity moves and
//! turns run their motion session to completion inside one cycle, so nothing else is read from
//! the mailbox until the move ends. Timed moves advance one step per cycle instead.
use embassy_time::{Duration, Instant, Timer};
use log::{info, warn};

use crate::autonomous::protocol::STATUS_KEY;
use crate::config::{seconds, DriveConfig, NOMINAL_BATTERY_VOLTAGE};
use crate::control::cheesy::{CheesyDrive, DriveGoal, DrivePosition};
use crate::control::motion::{
    MotionSession, MoveEnd, Step, StraightDrive, StraightGoal, Turn, WheelOutputs,
};
use crate::robot::commands::{
    AutoCommand, Command, DriveCommand, MoveParams, Reply, RobotMessage, RobotMode, SystemCommand,
};
use crate::robot::hardware::{ControlMode, Gyro, Motor, QuadEncoder, RangeFinder};
use crate::robot::mailbox::MailboxId;
use crate::robot::Context;
use crate::tasks::component::Component;

const STAMP: &str = "[DRIVETRAIN]";
const METERS_PER_INCH: f32 = 0.0254;

pub struct Drivetrain<M, E, G, R> {
    left: M,
    right: M,
    left_encoder: E,
    right_encoder: E,
    gyro: G,
    ranger: R,
    config: DriveConfig,
    cheesy: CheesyDrive,
    cheesy_goal: DriveGoal,
    session: MotionSession,
    battery_voltage: f32,
}

impl<M, E, G, R> Drivetrain<M, E, G, R>
where
    M: Motor,
    E: QuadEncoder,
    G: Gyro,
    R: RangeFinder,
{
    pub fn new(
        left: M,
        right: M,
        left_encoder: E,
        right_encoder: E,
        gyro: G,
        ranger: R,
        config: DriveConfig,
    ) -> Self {
        Self {
            left,
            right,
            left_encoder,
            right_encoder,
            gyro,
            ranger,
            config,
            cheesy: CheesyDrive::new(),
            cheesy_goal: DriveGoal::default(),
            session: MotionSession::Idle,
            battery_voltage: NOMINAL_BATTERY_VOLTAGE,
        }
    }

    pub fn session(&self) -> &MotionSession {
        &self.session
    }

    fn set_control_mode(&mut self, mode: ControlMode) {
        self.left.set_control_mode(mode);
        self.right.set_control_mode(mode);
    }

    /// Factor turning a -1..1 output into whatever the motors currently expect.
    fn output_scale(&self) -> f32 {
        match self.left.control_mode() {
            ControlMode::Velocity => {
                self.config.full_speed * self.battery_voltage / NOMINAL_BATTERY_VOLTAGE
            }
            _ => 1.0,
        }
    }

    fn drive(&mut self, outputs: WheelOutputs) {
        self.left.set(outputs.left);
        self.right.set(outputs.right);
    }

    fn stop_motors(&mut self) {
        self.drive(WheelOutputs::STOP);
        self.left.clear_error();
        self.right.clear_error();
        self.left.stop_motor();
        self.right.stop_motor();
    }

    fn distance_inches(&self, counts: i32) -> f32 {
        counts as f32 / self.config.counts_per_rev
            * core::f32::consts::PI
            * self.config.wheel_diameter_inches
    }

    fn position(&self) -> DrivePosition {
        // left encoder counts down when rolling forward
        let left = self.distance_inches(-self.left_encoder.position());
        let right = self.distance_inches(self.right_encoder.position());
        DrivePosition {
            left_encoder: left * METERS_PER_INCH,
            right_encoder: right * METERS_PER_INCH,
            gyro_angle: self.gyro.angle().to_radians(),
            gyro_velocity: self.gyro.rate().to_radians(),
            battery_voltage: self.battery_voltage,
        }
    }

    /// Feeds the cheesy filter and applies its output only when `apply` is set.
    fn run_cheesy(&mut self, apply: bool) {
        let position = self.position();
        let output = self.cheesy.update(&self.cheesy_goal, &position);
        if apply {
            self.left.set(-output.left_voltage / NOMINAL_BATTERY_VOLTAGE);
            self.right.set(output.right_voltage / NOMINAL_BATTERY_VOLTAGE);
        }
    }

    /// Clears the encoders before a measured move. Gives up after a bounded number of attempts
    /// or when autonomous ends.
    async fn zero_encoders(&mut self, ctx: &Context<'_>) -> bool {
        for _ in 0..self.config.zero_attempts {
            self.left_encoder.set_position(0);
            self.right_encoder.set_position(0);
            if self.right_encoder.position() == 0 {
                return true;
            }
            if !ctx.mode.in_auto() {
                break;
            }
            Timer::after(self.config.iterate_period).await;
        }
        warn!("{STAMP} encoder did not zero");
        false
    }

    async fn straight_move(
        &mut self,
        params: MoveParams,
        proximity: bool,
        ctx: &Context<'_>,
    ) -> Reply {
        if !self.zero_encoders(ctx).await {
            // counting from a stale position could end the move before it starts
            self.stop_motors();
            self.session = MotionSession::Idle;
            ctx.telemetry.put_string(STATUS_KEY, "move error");
            return Reply::Error;
        }
        self.gyro.zero();

        let goal = if proximity {
            Timer::after(self.config.range_settle).await;
            let range = self.ranger.range_inches();
            info!("{STAMP} range {range:.1} in, stopping {} in short", params.distance);
            StraightGoal::StandOff {
                range,
                standoff: params.distance,
            }
        } else {
            StraightGoal::Distance(params.distance)
        };

        let drive = StraightDrive::start(
            params.speed,
            goal,
            seconds(params.timeout),
            Instant::now(),
            &self.config,
        );
        self.session = MotionSession::StraightDriving(drive);

        let end = loop {
            let step = drive.step(
                Instant::now(),
                ctx.mode.in_auto(),
                self.right_encoder.position(),
                self.gyro.angle(),
                &self.config,
            );
            match step {
                Step::Drive(outputs) => {
                    self.drive(outputs.scaled(self.output_scale()));
                    Timer::after(self.config.iterate_period).await;
                }
                Step::Finished(end) => break end,
            }
        };

        info!(
            "{STAMP} straight move {end:?}, travelled {} of {:?} counts",
            self.right_encoder.position(),
            drive.target_counts
        );
        self.finish(end)
    }

    async fn turn(&mut self, angle: f32, timeout: f32, ctx: &Context<'_>) -> Reply {
        self.gyro.zero();
        let turn = Turn::start(angle, seconds(timeout), Instant::now());
        self.session = MotionSession::Turning(turn);

        let end = loop {
            match turn.step(Instant::now(), ctx.mode.in_auto(), self.gyro.angle(), &self.config) {
                Step::Drive(output) => {
                    let output = output * self.output_scale();
                    self.drive(WheelOutputs {
                        left: output,
                        right: output,
                    });
                    Timer::after(self.config.iterate_period).await;
                }
                Step::Finished(end) => break end,
            }
        };

        info!("{STAMP} turn {end:?} at {:.1} degrees", self.gyro.angle());
        self.finish(end)
    }

    fn finish(&mut self, end: MoveEnd) -> Reply {
        self.stop_motors();
        self.session = MotionSession::Idle;
        match end {
            MoveEnd::Reached | MoveEnd::TimedOut => Reply::Ok,
            MoveEnd::Cancelled => Reply::Error,
        }
    }

    fn start_timed_move(&mut self, speed: f32, time: f32) {
        self.gyro.zero();
        let drive = StraightDrive::start(
            speed,
            StraightGoal::Timed,
            seconds(time),
            Instant::now(),
            &self.config,
        );
        self.session = MotionSession::StraightDriving(drive);
    }

    /// One step of a timed move, if one is running.
    fn iterate_timed_move(&mut self, ctx: &Context<'_>) {
        let MotionSession::StraightDriving(drive) = self.session else {
            return;
        };
        let step = drive.step(
            Instant::now(),
            ctx.mode.in_auto(),
            self.right_encoder.position(),
            self.gyro.angle(),
            &self.config,
        );
        match step {
            Step::Drive(outputs) => self.drive(outputs.scaled(self.output_scale())),
            Step::Finished(end) => {
                info!("{STAMP} timed move {end:?}");
                self.finish(end);
            }
        }
    }

    fn begin_session(&mut self) {
        info!("{STAMP} autonomous session begins");
        self.session = MotionSession::Idle;
        self.set_control_mode(ControlMode::Velocity);
        self.drive(WheelOutputs::STOP);
        self.gyro.zero();
    }

    fn report(&self, ctx: &Context<'_>) {
        let position = self.position();
        ctx.telemetry.put_number("Battery", self.battery_voltage);
        ctx.telemetry.put_number("angle", position.gyro_angle);
        ctx.telemetry.put_number("angle rate", position.gyro_velocity);
        ctx.telemetry.put_number("left encoder", position.left_encoder);
        ctx.telemetry.put_number("right encoder", position.right_encoder);
    }
}

impl<M, E, G, R> Component for Drivetrain<M, E, G, R>
where
    M: Motor,
    E: QuadEncoder,
    G: Gyro,
    R: RangeFinder,
{
    const ID: MailboxId = MailboxId::Drivetrain;
    const STAMP: &'static str = STAMP;

    fn cycle(&self) -> Duration {
        self.config.cycle
    }

    async fn on_state_change(&mut self, mode: RobotMode, _ctx: &Context<'_>) {
        self.session = MotionSession::Idle;
        match mode {
            RobotMode::Autonomous => {
                self.set_control_mode(ControlMode::Velocity);
                self.drive(WheelOutputs::STOP);
                self.gyro.zero();
            }
            _ => {
                self.set_control_mode(ControlMode::PercentOutput);
                self.drive(WheelOutputs::STOP);
            }
        }
    }

    fn safety_check(&mut self, ctx: &Context<'_>) -> bool {
        self.report(ctx);
        false
    }

    async fn run(&mut self, message: &RobotMessage, ctx: &Context<'_>) -> Reply {
        let enabled = ctx.mode.get().is_enabled();

        match message.command {
            Command::Drive(command) => {
                // any new drive command replaces a timed move in progress
                if !matches!(command, DriveCommand::TimedMove { .. }) {
                    self.session = MotionSession::Idle;
                }
                match command {
                    DriveCommand::Stop => self.drive(WheelOutputs::STOP),
                    DriveCommand::Tank { left, right } => self.drive(WheelOutputs { left, right }),
                    DriveCommand::Cheesy {
                        wheel,
                        throttle,
                        quickturn,
                    } => {
                        let steering = if quickturn { wheel * wheel * wheel } else { wheel };
                        self.cheesy_goal = DriveGoal {
                            steering,
                            throttle,
                            quickturn,
                        };
                        self.run_cheesy(enabled);
                        return Reply::Ok;
                    }
                    DriveCommand::AutoMove { left, right } => {
                        let scale = self.output_scale();
                        self.drive(WheelOutputs { left, right }.scaled(scale));
                    }
                    DriveCommand::MeasuredMove(params) => {
                        return self.straight_move(params, false, ctx).await
                    }
                    DriveCommand::ProximityMove(params) => {
                        return self.straight_move(params, true, ctx).await
                    }
                    DriveCommand::TimedMove { speed, time } => self.start_timed_move(speed, time),
                    DriveCommand::Turn { angle, timeout } => {
                        return self.turn(angle, timeout, ctx).await
                    }
                }
            }
            Command::Auto(AutoCommand::Run) => self.begin_session(),
            Command::Auto(AutoCommand::Complete) => {
                info!("{STAMP} autonomous session complete");
                self.session = MotionSession::Idle;
                self.stop_motors();
            }
            Command::System(SystemCommand::Constants { battery_voltage }) => {
                self.battery_voltage = battery_voltage;
            }
            Command::System(SystemCommand::MsgTimeout) => self.iterate_timed_move(ctx),
            _ => {}
        }

        if self.session.is_idle() {
            self.run_cheesy(false);
        }
        Reply::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::motion::inches_to_counts;
    use crate::robot::mailbox::PostOffice;
    use crate::robot::state::ModeFlag;
    use crate::sim::{
        ChassisEncoder, ChassisMotor, Probe, RecordingTelemetry, Side, SimChassis, SimGyro,
        SimRanger,
    };
    use crate::tasks::component::run_cycle;
    use embassy_futures::block_on;

    type SimDrivetrain<'a> =
        Drivetrain<ChassisMotor<'a>, ChassisEncoder<'a>, SimGyro<'a>, SimRanger<'a>>;

    fn drivetrain<'a>(chassis: &'a SimChassis, range: &'a Probe<f32>) -> SimDrivetrain<'a> {
        Drivetrain::new(
            chassis.motor(Side::Left),
            chassis.motor(Side::Right),
            chassis.encoder(Side::Left),
            chassis.encoder(Side::Right),
            chassis.gyro(),
            range.ranger(),
            DriveConfig {
                range_settle: Duration::from_millis(10),
                ..DriveConfig::default()
            },
        )
    }

    fn call(command: DriveCommand) -> RobotMessage {
        RobotMessage::with_reply(Command::Drive(command), MailboxId::AutoParser)
    }

    fn measured_move(chassis: &SimChassis, inches: f32) -> Reply {
        let range = Probe::new(0.0);
        let mut dt = drivetrain(chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);

        let params = MoveParams {
            speed: 0.5,
            distance: inches,
            timeout: 3.0,
        };
        block_on(async {
            dt.begin_session();
            let reply = dt.run(&call(DriveCommand::MeasuredMove(params)), &ctx).await;
            assert!(dt.session().is_idle());
            reply
        })
    }

    #[test]
    fn measured_move_stops_at_the_distance() {
        let config = DriveConfig::default();
        for inches in [6.0, 24.0] {
            let chassis = SimChassis::default();
            assert_eq!(measured_move(&chassis, inches), Reply::Ok);
            assert_eq!(chassis.output(Side::Left), 0.0);
            assert_eq!(chassis.output(Side::Right), 0.0);

            // one 5 ms step at half speed is 5 counts in the sim; allow a few late wakeups
            let target = inches_to_counts(inches, &config);
            let travelled = chassis.travelled(Side::Right);
            assert!(travelled >= target - 1.0, "{inches} in: travelled {travelled} of {target}");
            assert!(travelled < target + 40.0, "{inches} in: travelled {travelled} of {target}");
        }
    }

    #[test]
    fn measured_move_fails_when_the_encoder_will_not_zero() {
        struct StuckEncoder(i32);

        impl QuadEncoder for StuckEncoder {
            fn position(&self) -> i32 {
                self.0
            }

            fn set_position(&mut self, _counts: i32) {}
        }

        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = Drivetrain::new(
            chassis.motor(Side::Left),
            chassis.motor(Side::Right),
            StuckEncoder(-900),
            StuckEncoder(900),
            chassis.gyro(),
            range.ranger(),
            DriveConfig {
                zero_attempts: 3,
                ..DriveConfig::default()
            },
        );
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);

        let params = MoveParams {
            speed: 0.5,
            distance: 24.0,
            timeout: 3.0,
        };
        let reply = block_on(dt.run(&call(DriveCommand::MeasuredMove(params)), &ctx));
        assert_eq!(reply, Reply::Error);
        assert!(dt.session().is_idle());
        assert_eq!(chassis.output(Side::Right), 0.0);
        assert_eq!(chassis.travelled(Side::Right), 0.0);
        assert_eq!(telemetry.last(STATUS_KEY).as_deref(), Some("move error"));
    }

    #[test]
    fn measured_move_times_out_when_the_wheels_slip() {
        let chassis = SimChassis::new(crate::sim::ChassisConfig {
            counts_per_second: 0.0,
            ..Default::default()
        });
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);

        let params = MoveParams {
            speed: 0.5,
            distance: 24.0,
            timeout: 0.1,
        };
        let started = Instant::now();
        let reply = block_on(dt.run(&call(DriveCommand::MeasuredMove(params)), &ctx));
        assert_eq!(reply, Reply::Ok);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(chassis.output(Side::Right), 0.0);
    }

    #[test]
    fn leaving_autonomous_cancels_a_move() {
        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Teleoperated);

        let reply = block_on(dt.run(
            &call(DriveCommand::Turn {
                angle: 90.0,
                timeout: 2.0,
            }),
            &ctx,
        ));
        assert_eq!(reply, Reply::Error);
        assert_eq!(chassis.output(Side::Left), 0.0);
    }

    #[test]
    fn turn_reaches_the_dead_band() {
        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);

        let reply = block_on(async {
            dt.begin_session();
            dt.run(
                &call(DriveCommand::Turn {
                    angle: -45.0,
                    timeout: 2.0,
                }),
                &ctx,
            )
            .await
        });
        assert_eq!(reply, Reply::Ok);
        assert!((chassis.heading() + 45.0).abs() < 3.0, "heading {}", chassis.heading());
        assert_eq!(chassis.output(Side::Left), 0.0);
        assert_eq!(chassis.output(Side::Right), 0.0);
    }

    #[test]
    fn proximity_move_stops_short_of_the_obstacle() {
        let chassis = SimChassis::default();
        let range = Probe::new(40.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);

        let params = MoveParams {
            speed: 0.5,
            distance: 10.0,
            timeout: 3.0,
        };
        let reply = block_on(async {
            dt.begin_session();
            dt.run(&call(DriveCommand::ProximityMove(params)), &ctx).await
        });
        assert_eq!(reply, Reply::Ok);
        let gap = inches_to_counts(30.0, &dt.config);
        let travelled = chassis.travelled(Side::Right);
        assert!(travelled >= gap - 1.0, "travelled {travelled} of {gap}");
        assert!(travelled < gap + 40.0, "travelled {travelled} of {gap}");
    }

    #[test]
    fn timed_move_runs_across_cycles() {
        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);
        mode.set(RobotMode::Autonomous);
        let mut loops = 0;

        block_on(async {
            post.send(
                MailboxId::Drivetrain,
                RobotMessage::new(Command::Drive(DriveCommand::TimedMove {
                    speed: 0.4,
                    time: 0.1,
                })),
            )
            .await;
            run_cycle(&mut dt, &ctx, &mut loops).await;
            assert!(matches!(dt.session(), MotionSession::StraightDriving(_)));

            run_cycle(&mut dt, &ctx, &mut loops).await;
            assert!(chassis.output(Side::Right) > 0.0);
            assert!(chassis.output(Side::Left) < 0.0);

            Timer::after(Duration::from_millis(120)).await;
            run_cycle(&mut dt, &ctx, &mut loops).await;
        });
        assert!(dt.session().is_idle());
        assert_eq!(chassis.output(Side::Right), 0.0);
        // nobody asked for an answer
        assert!(post.mailbox(MailboxId::AutoParser).is_empty());
    }

    #[test]
    fn cheesy_output_only_applies_when_enabled() {
        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);

        let cheesy = RobotMessage::new(Command::Drive(DriveCommand::Cheesy {
            wheel: 0.0,
            throttle: 0.5,
            quickturn: false,
        }));

        mode.set(RobotMode::Disabled);
        block_on(dt.run(&cheesy, &ctx));
        assert_eq!(chassis.output(Side::Right), 0.0);

        mode.set(RobotMode::Teleoperated);
        block_on(dt.run(&cheesy, &ctx));
        assert!((chassis.output(Side::Right) - 0.5).abs() < 1e-4);
        assert!((chassis.output(Side::Left) + 0.5).abs() < 1e-4);
    }

    #[test]
    fn state_change_picks_the_control_mode() {
        let chassis = SimChassis::default();
        let range = Probe::new(0.0);
        let mut dt = drivetrain(&chassis, &range);
        let post = PostOffice::new();
        let mode = ModeFlag::new();
        let telemetry = RecordingTelemetry::new();
        let ctx = Context::new(&post, &mode, &telemetry);

        block_on(dt.on_state_change(RobotMode::Autonomous, &ctx));
        assert_eq!(chassis.control_mode(Side::Left), ControlMode::Velocity);
        block_on(dt.on_state_change(RobotMode::Teleoperated, &ctx));
        assert_eq!(chassis.control_mode(Side::Right), ControlMode::PercentOutput);
    }
}
