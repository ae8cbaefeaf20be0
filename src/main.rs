//! Host build of the robot.
//!
//! Every task runs against the software robot from `rhs_robot::sim`, and the main task plays a
//! short match (disabled, autonomous, teleop, disabled) the way the field would.
//!
//! Usage: `rhs_robot [SCRIPT]`, with `RUST_LOG` picking the log level.
use anyhow::{Context as _, Result};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use log::{error, info};

use rhs_robot::autonomous::{AutoControl, Caller, FileScript, ScriptSource};
use rhs_robot::config::{
    ArmConfig, AutoConfig, ClimberConfig, DriveConfig, GearIntakeConfig, COMPONENT_CYCLE,
    ROBOT_NAME, ROBOT_NICKNAME, ROBOT_VERSION, SCRIPT_PATH,
};
use rhs_robot::robot::commands::RobotMode;
use rhs_robot::robot::mailbox::PostOffice;
use rhs_robot::robot::state::ModeFlag;
use rhs_robot::robot::telemetry::LogTelemetry;
use rhs_robot::robot::Context;
use rhs_robot::sim::{
    ChassisEncoder, ChassisMotor, MotorProbe, Probe, Side, SimChassis, SimEncoder, SimGyro,
    SimMotor, SimRanger, SimSwitch,
};
use rhs_robot::tasks::autonomous::Autonomous;
use rhs_robot::tasks::climber::Climber;
use rhs_robot::tasks::component::run_component;
use rhs_robot::tasks::dispatcher::{Dispatcher, DriverInput};
use rhs_robot::tasks::drivetrain::Drivetrain;
use rhs_robot::tasks::gear_floor_intake::GearFloorIntake;
use rhs_robot::tasks::gear_intake::GearIntake;
use rhs_robot::tasks::hopper::Hopper;

macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.init_with(|| $val)
    }};
}

const AUTONOMOUS_PERIOD: Duration = Duration::from_secs(15);

type SimDrivetrain =
    Drivetrain<ChassisMotor<'static>, ChassisEncoder<'static>, SimGyro<'static>, SimRanger<'static>>;
type SimFloorIntake = GearFloorIntake<SimMotor<'static>, SimEncoder<'static>, SimSwitch<'static>>;
type SimAutonomous = Autonomous<'static, FileScript>;

#[embassy_executor::task]
async fn drivetrain_task(drivetrain: &'static mut SimDrivetrain, ctx: Context<'static>) {
    run_component(drivetrain, ctx).await
}

#[embassy_executor::task]
async fn climber_task(climber: &'static mut Climber<SimMotor<'static>>, ctx: Context<'static>) {
    run_component(climber, ctx).await
}

#[embassy_executor::task]
async fn hopper_task(hopper: &'static mut Hopper<SimMotor<'static>>, ctx: Context<'static>) {
    run_component(hopper, ctx).await
}

#[embassy_executor::task]
async fn gear_intake_task(
    intake: &'static mut GearIntake<SimMotor<'static>>,
    ctx: Context<'static>,
) {
    run_component(intake, ctx).await
}

#[embassy_executor::task]
async fn gear_floor_task(intake: &'static mut SimFloorIntake, ctx: Context<'static>) {
    run_component(intake, ctx).await
}

#[embassy_executor::task]
async fn autonomous_task(auto: &'static mut SimAutonomous, ctx: Context<'static>) {
    run_component(auto, ctx).await
}

/// Loads the script once up front so a bad path fails before the match starts.
fn checked_script() -> Result<FileScript> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SCRIPT_PATH.to_string());
    let source = FileScript::new(&path);
    let script = source
        .load()
        .with_context(|| format!("loading autonomous script {path}"))?;
    info!("[MAIN] {path}: {} lines", script.len());
    Ok(source)
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = play_match(spawner).await {
        error!("[MAIN] {e:#}");
        std::process::exit(1);
    }
    std::process::exit(0);
}

async fn play_match(spawner: Spawner) -> Result<()> {
    info!("[MAIN] {ROBOT_NAME} ({ROBOT_NICKNAME}) version {ROBOT_VERSION}");
    let source = checked_script()?;

    let post: &'static PostOffice = mk_static!(PostOffice, PostOffice::new());
    let mode: &'static ModeFlag = mk_static!(ModeFlag, ModeFlag::new());
    let telemetry: &'static LogTelemetry = mk_static!(LogTelemetry, LogTelemetry);
    let control: &'static AutoControl = mk_static!(AutoControl, AutoControl::new());
    let ctx = Context::new(post, mode, telemetry);

    // Software robot
    let chassis: &'static SimChassis = mk_static!(SimChassis, SimChassis::default());
    let range: &'static Probe<f32> = mk_static!(Probe<f32>, Probe::new(60.0));
    let climber_motors: &'static [MotorProbe; 2] =
        mk_static!([MotorProbe; 2], [MotorProbe::new(), MotorProbe::new()]);
    let hopper_motor: &'static MotorProbe = mk_static!(MotorProbe, MotorProbe::new());
    let gripper_motor: &'static MotorProbe = mk_static!(MotorProbe, MotorProbe::new());
    let arm_motors: &'static [MotorProbe; 2] =
        mk_static!([MotorProbe; 2], [MotorProbe::new(), MotorProbe::new()]);
    let arm_sensor: &'static Probe<i32> = mk_static!(Probe<i32>, Probe::new(2048));
    let gear_switch: &'static Probe<bool> = mk_static!(Probe<bool>, Probe::new(false));

    let drivetrain = mk_static!(
        SimDrivetrain,
        Drivetrain::new(
            chassis.motor(Side::Left),
            chassis.motor(Side::Right),
            chassis.encoder(Side::Left),
            chassis.encoder(Side::Right),
            chassis.gyro(),
            range.ranger(),
            DriveConfig::default(),
        )
    );
    let climber = mk_static!(
        Climber<SimMotor<'static>>,
        Climber::new(
            climber_motors[0].motor(),
            climber_motors[1].motor(),
            ClimberConfig::default(),
        )
    );
    let hopper = mk_static!(Hopper<SimMotor<'static>>, Hopper::new(hopper_motor.motor()));
    let gear_intake = mk_static!(
        GearIntake<SimMotor<'static>>,
        GearIntake::new(gripper_motor.motor(), GearIntakeConfig::default())
    );
    let gear_floor = mk_static!(
        SimFloorIntake,
        GearFloorIntake::new(
            arm_motors[0].motor(),
            arm_motors[1].motor(),
            arm_sensor.encoder(),
            gear_switch.switch(),
            ArmConfig::default(),
        )
    );
    let auto_config = AutoConfig::default();
    let autonomous = mk_static!(
        SimAutonomous,
        Autonomous::new(
            source,
            Caller::new(post, telemetry, auto_config.reply_timeout),
            control,
            auto_config,
        )
    );

    info!("[MAIN] Starting robot tasks...");
    spawner
        .spawn(drivetrain_task(drivetrain, ctx))
        .expect("Fail spawning drivetrain task");
    spawner
        .spawn(climber_task(climber, ctx))
        .expect("Fail spawning climber task");
    spawner
        .spawn(hopper_task(hopper, ctx))
        .expect("Fail spawning hopper task");
    spawner
        .spawn(gear_intake_task(gear_intake, ctx))
        .expect("Fail spawning gear intake task");
    spawner
        .spawn(gear_floor_task(gear_floor, ctx))
        .expect("Fail spawning gear floor task");
    spawner
        .spawn(autonomous_task(autonomous, ctx))
        .expect("Fail spawning autonomous task");

    let mut dispatcher = Dispatcher::new(post, mode, telemetry, control);
    dispatcher.set_battery(12.4);
    dispatcher.change_state(RobotMode::Disabled).await;
    Timer::after_millis(500).await;

    dispatcher.change_state(RobotMode::Autonomous).await;
    Timer::after(AUTONOMOUS_PERIOD).await;
    info!(
        "[MAIN] autonomous over: heading {:.1}, wheels {:.0}/{:.0} counts",
        chassis.heading(),
        chassis.travelled(Side::Left),
        chassis.travelled(Side::Right)
    );

    dispatcher.change_state(RobotMode::Teleoperated).await;
    let forward = DriverInput {
        throttle: 0.5,
        ..DriverInput::default()
    };
    let spin = DriverInput {
        wheel: 0.5,
        quickturn: true,
        ..DriverInput::default()
    };
    for (input, loops) in [(forward, 50), (spin, 25), (DriverInput::default(), 10)] {
        for _ in 0..loops {
            dispatcher.teleop(input);
            Timer::after(COMPONENT_CYCLE).await;
        }
    }

    dispatcher.change_state(RobotMode::Disabled).await;
    Timer::after_millis(200).await;
    info!(
        "[MAIN] match over: heading {:.1}, wheels {:.0}/{:.0} counts",
        chassis.heading(),
        chassis.travelled(Side::Left),
        chassis.travelled(Side::Right)
    );
    Ok(())
}
