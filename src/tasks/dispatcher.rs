//! Top-level dispatcher: tracks the robot mode and turns driver input into subsystem commands.
//!
//! Sampling the joysticks is the board's business; the dispatcher gets an already-read
//! [`DriverInput`] each loop. Drive commands go out every loop. Button actions fire on the
//! press, and held levers (climber, hopper, roller) only post when what they ask for changes.
use log::info;

use crate::autonomous::AutoControl;
use crate::robot::commands::{
    ClimberCommand, Command, DriveCommand, FloorCommand, GearCommand, HopperCommand, RobotMessage,
    RobotMode, SystemCommand,
};
use crate::robot::mailbox::{MailboxId, PostOffice};
use crate::robot::state::ModeFlag;
use crate::robot::telemetry::Telemetry;

const STAMP: &str = "[DISPATCHER]";

/// Triggers below this count as released.
const TRIGGER_DEAD_BAND: f32 = 0.1;
const CLIMB_UP_SPEED: f32 = 1.0;
const CLIMB_DOWN_SPEED: f32 = 0.2;
const HOPPER_SPEED: f32 = 1.0;
const GEAR_SPEED: f32 = 0.5;

/// One sample of the driver station controls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverInput {
    /// Forward is positive, -1.0..=1.0.
    pub throttle: f32,
    /// Right is positive, -1.0..=1.0.
    pub wheel: f32,
    pub quickturn: bool,
    pub arm_next: bool,
    pub arm_previous: bool,
    pub arm_floor: bool,
    /// Trigger travel, 0.0..=1.0.
    pub roller_in: f32,
    pub roller_out: f32,
    pub gear_hold: bool,
    pub gear_release: bool,
    pub climb_up: bool,
    pub climb_down: bool,
    pub hopper_up: bool,
    pub hopper_down: bool,
    pub pause_auto: bool,
}

pub struct Dispatcher<'a> {
    post: &'a PostOffice,
    mode: &'a ModeFlag,
    telemetry: &'a dyn Telemetry,
    control: &'a AutoControl,
    previous: DriverInput,
    climber: ClimberCommand,
    hopper: HopperCommand,
    roller: FloorCommand,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        post: &'a PostOffice,
        mode: &'a ModeFlag,
        telemetry: &'a dyn Telemetry,
        control: &'a AutoControl,
    ) -> Self {
        Self {
            post,
            mode,
            telemetry,
            control,
            previous: DriverInput::default(),
            climber: ClimberCommand::Stop,
            hopper: HopperCommand::Stop,
            roller: FloorCommand::Stop,
        }
    }

    /// Records the new mode and tells every task about it. Returns `false` if nothing changed.
    pub async fn change_state(&mut self, mode: RobotMode) -> bool {
        if self.mode.get() == mode {
            return false;
        }
        info!("{STAMP} {} -> {mode}", self.mode.get());

        // Motion loops read the flag, so it must be set before anyone hears the broadcast
        self.mode.set(mode);
        self.telemetry.put_string("Robot State", mode_label(mode));

        self.climber = ClimberCommand::Stop;
        self.hopper = HopperCommand::Stop;
        self.roller = FloorCommand::Stop;
        self.post.broadcast(Command::State(mode)).await;
        true
    }

    pub fn set_battery(&self, battery_voltage: f32) -> bool {
        self.telemetry.put_number("Battery Voltage", battery_voltage);
        let command = Command::System(SystemCommand::Constants { battery_voltage });
        self.post.try_send(MailboxId::Drivetrain, RobotMessage::new(command))
    }

    fn send(&self, to: MailboxId, command: Command, posted: &mut usize) -> bool {
        let sent = self.post.try_send(to, RobotMessage::new(command));
        if sent {
            *posted += 1;
        }
        sent
    }

    /// Maps one input sample to commands and returns how many were posted.
    ///
    /// Nothing but the pause toggle works outside teleop and test.
    pub fn teleop(&mut self, input: DriverInput) -> usize {
        let previous = core::mem::replace(&mut self.previous, input);
        let pressed = |now: bool, before: bool| now && !before;

        if pressed(input.pause_auto, previous.pause_auto) {
            self.control.toggle_pause();
            self.telemetry
                .put_bool("Auto Paused", self.control.is_paused());
        }

        if !matches!(self.mode.get(), RobotMode::Teleoperated | RobotMode::Test) {
            return 0;
        }

        let mut posted = 0;

        let drive = DriveCommand::Cheesy {
            wheel: input.wheel,
            throttle: input.throttle,
            quickturn: input.quickturn,
        };
        self.send(MailboxId::Drivetrain, Command::Drive(drive), &mut posted);

        let floor = MailboxId::GearFloorIntake;
        if pressed(input.arm_floor, previous.arm_floor) {
            self.send(floor, Command::Floor(FloorCommand::FloorPosition), &mut posted);
        } else if pressed(input.arm_next, previous.arm_next) {
            self.send(floor, Command::Floor(FloorCommand::NextPosition), &mut posted);
        } else if pressed(input.arm_previous, previous.arm_previous) {
            self.send(floor, Command::Floor(FloorCommand::PreviousPosition), &mut posted);
        }

        let roller = if input.roller_in > TRIGGER_DEAD_BAND {
            FloorCommand::PullIn(input.roller_in)
        } else if input.roller_out > TRIGGER_DEAD_BAND {
            FloorCommand::PushOut(input.roller_out)
        } else {
            FloorCommand::Stop
        };
        // a dropped lever command is retried on the next sample
        if roller != self.roller && self.send(floor, Command::Floor(roller), &mut posted) {
            self.roller = roller;
        }

        if pressed(input.gear_hold, previous.gear_hold) {
            let command = Command::Gear(GearCommand::Hold(GEAR_SPEED));
            self.send(MailboxId::GearIntake, command, &mut posted);
        } else if pressed(input.gear_release, previous.gear_release) {
            let command = Command::Gear(GearCommand::Release(GEAR_SPEED));
            self.send(MailboxId::GearIntake, command, &mut posted);
        }

        let climber = if input.climb_up {
            ClimberCommand::Up(CLIMB_UP_SPEED)
        } else if input.climb_down {
            ClimberCommand::Down(CLIMB_DOWN_SPEED)
        } else {
            ClimberCommand::Stop
        };
        if climber != self.climber
            && self.send(MailboxId::Climber, Command::Climber(climber), &mut posted)
        {
            self.climber = climber;
        }

        let hopper = if input.hopper_up {
            HopperCommand::Up(HOPPER_SPEED)
        } else if input.hopper_down {
            HopperCommand::Down(HOPPER_SPEED)
        } else {
            HopperCommand::Stop
        };
        if hopper != self.hopper
            && self.send(MailboxId::Hopper, Command::Hopper(hopper), &mut posted)
        {
            self.hopper = hopper;
        }

        posted
    }
}

fn mode_label(mode: RobotMode) -> &'static str {
    match mode {
        RobotMode::Disabled => "disabled",
        RobotMode::Autonomous => "autonomous",
        RobotMode::Teleoperated => "teleop",
        RobotMode::Test => "test",
        RobotMode::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAILBOX_DEPTH;
    use crate::sim::RecordingTelemetry;
    use embassy_futures::block_on;

    struct Station {
        post: PostOffice,
        mode: ModeFlag,
        telemetry: RecordingTelemetry,
        control: AutoControl,
    }

    impl Station {
        fn new() -> Self {
            Self {
                post: PostOffice::new(),
                mode: ModeFlag::new(),
                telemetry: RecordingTelemetry::new(),
                control: AutoControl::new(),
            }
        }

        fn dispatcher(&self) -> Dispatcher<'_> {
            Dispatcher::new(&self.post, &self.mode, &self.telemetry, &self.control)
        }

        fn drain(&self, id: MailboxId) -> std::vec::Vec<Command> {
            let mut commands = std::vec::Vec::new();
            while let Ok(message) = self.post.mailbox(id).try_receive() {
                commands.push(message.command);
            }
            commands
        }
    }

    #[test]
    fn state_changes_set_the_flag_and_reach_every_task() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();

        assert!(block_on(dispatcher.change_state(RobotMode::Autonomous)));
        assert!(station.mode.in_auto());
        for id in MailboxId::TASKS {
            assert_eq!(
                station.drain(id),
                [Command::State(RobotMode::Autonomous)],
                "{id}"
            );
        }
        assert_eq!(
            station.telemetry.last("Robot State").as_deref(),
            Some("autonomous")
        );

        assert!(!block_on(dispatcher.change_state(RobotMode::Autonomous)));
        assert!(station.post.mailbox(MailboxId::Drivetrain).is_empty());
    }

    #[test]
    fn autonomous_ignores_the_sticks() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        block_on(dispatcher.change_state(RobotMode::Autonomous));
        for id in MailboxId::TASKS {
            station.post.discard(id);
        }

        let input = DriverInput {
            throttle: 1.0,
            climb_up: true,
            ..DriverInput::default()
        };
        assert_eq!(dispatcher.teleop(input), 0);
        assert!(station.post.mailbox(MailboxId::Drivetrain).is_empty());
        assert!(station.post.mailbox(MailboxId::Climber).is_empty());
    }

    #[test]
    fn buttons_fire_once_per_press() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        station.mode.set(RobotMode::Teleoperated);

        let held = DriverInput {
            arm_next: true,
            gear_hold: true,
            ..DriverInput::default()
        };
        assert_eq!(dispatcher.teleop(held), 3);
        assert_eq!(dispatcher.teleop(held), 1);
        dispatcher.teleop(DriverInput::default());
        dispatcher.teleop(held);

        assert_eq!(
            station.drain(MailboxId::GearFloorIntake),
            [
                Command::Floor(FloorCommand::NextPosition),
                Command::Floor(FloorCommand::NextPosition)
            ]
        );
        assert_eq!(station.drain(MailboxId::GearIntake).len(), 2);
        assert_eq!(station.drain(MailboxId::Drivetrain).len(), 4);
    }

    #[test]
    fn levers_post_only_when_they_change() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        station.mode.set(RobotMode::Test);

        let climbing = DriverInput {
            climb_up: true,
            roller_in: 0.8,
            ..DriverInput::default()
        };
        dispatcher.teleop(climbing);
        dispatcher.teleop(climbing);
        dispatcher.teleop(DriverInput::default());

        assert_eq!(
            station.drain(MailboxId::Climber),
            [
                Command::Climber(ClimberCommand::Up(1.0)),
                Command::Climber(ClimberCommand::Stop)
            ]
        );
        assert_eq!(
            station.drain(MailboxId::GearFloorIntake),
            [
                Command::Floor(FloorCommand::PullIn(0.8)),
                Command::Floor(FloorCommand::Stop)
            ]
        );
        assert!(station.post.mailbox(MailboxId::Hopper).is_empty());
    }

    #[test]
    fn a_dropped_lever_release_is_sent_again() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        station.mode.set(RobotMode::Teleoperated);

        dispatcher.teleop(DriverInput {
            climb_up: true,
            ..DriverInput::default()
        });
        station.drain(MailboxId::Climber);

        let filler = RobotMessage::new(Command::Climber(ClimberCommand::Up(1.0)));
        for _ in 0..MAILBOX_DEPTH {
            assert!(station.post.try_send(MailboxId::Climber, filler));
        }
        dispatcher.teleop(DriverInput::default());
        assert_eq!(station.drain(MailboxId::Climber).len(), MAILBOX_DEPTH);

        dispatcher.teleop(DriverInput::default());
        dispatcher.teleop(DriverInput::default());
        assert_eq!(
            station.drain(MailboxId::Climber),
            [Command::Climber(ClimberCommand::Stop)]
        );
    }

    #[test]
    fn drive_sticks_become_cheesy_commands() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        station.mode.set(RobotMode::Teleoperated);

        dispatcher.teleop(DriverInput {
            throttle: 0.6,
            wheel: -0.2,
            quickturn: true,
            ..DriverInput::default()
        });
        assert_eq!(
            station.drain(MailboxId::Drivetrain),
            [Command::Drive(DriveCommand::Cheesy {
                wheel: -0.2,
                throttle: 0.6,
                quickturn: true
            })]
        );
    }

    #[test]
    fn pause_toggles_in_any_mode() {
        let station = Station::new();
        let mut dispatcher = station.dispatcher();
        station.mode.set(RobotMode::Autonomous);

        let pause = DriverInput {
            pause_auto: true,
            ..DriverInput::default()
        };
        dispatcher.teleop(pause);
        assert!(station.control.is_paused());
        dispatcher.teleop(pause);
        assert!(station.control.is_paused());
        dispatcher.teleop(DriverInput::default());
        dispatcher.teleop(pause);
        assert!(!station.control.is_paused());
    }

    #[test]
    fn battery_voltage_goes_to_the_drivetrain() {
        let station = Station::new();
        let dispatcher = station.dispatcher();
        assert!(dispatcher.set_battery(11.5));
        assert_eq!(
            station.drain(MailboxId::Drivetrain),
            [Command::System(SystemCommand::Constants {
                battery_voltage: 11.5
            })]
        );
    }
}
