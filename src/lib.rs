//! Library root for the RhsRobot control software.
//!
//! Re-exports all main modules: [`config`], [`robot`], [`control`], [`autonomous`], [`tasks`]
//! and the software robot in [`sim`]. Used by the host binary and by the tests; on-robot builds
//! drop the `std` feature and link against the board's own executor and drivers.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod autonomous;
pub mod config;
pub mod control;
pub mod robot;
pub mod sim;
pub mod tasks;
