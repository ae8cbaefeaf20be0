//! Long-running robot tasks.
//!
//! Each subsystem is a [`component::Component`] driven by [`component::run_component`]:
//! - [`drivetrain`]: teleop driving and the autonomous motion sessions.
//! - [`climber`], [`hopper`], [`gear_intake`], [`gear_floor_intake`]: mechanisms.
//! - [`autonomous`]: loads and runs the script when the robot enters autonomous.
//!
//! [`dispatcher`] is not a component. It owns the robot mode and turns driver input into
//! commands, and is driven from the main loop.
//!
//! Tasks are spawned from `main.rs` and talk only through the [`crate::robot::mailbox::PostOffice`].
pub mod autonomous;
pub mod climber;
pub mod component;
pub mod dispatcher;
pub mod drivetrain;
pub mod gear_floor_intake;
pub mod gear_intake;
pub mod hopper;
