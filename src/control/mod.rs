//! Drive math with no task or hardware attached.
pub mod cheesy;
pub mod motion;
