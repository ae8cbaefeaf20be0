//! Write-only status sink for the driver station dashboard.
//!
//! Nothing in the robot reads these values back; a sink that drops everything is valid.
use log::debug;

pub trait Telemetry {
    fn put_string(&self, key: &str, value: &str);
    fn put_number(&self, key: &str, value: f32);
    fn put_bool(&self, key: &str, value: bool);
}

/// Sends every dashboard update to the log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn put_string(&self, key: &str, value: &str) {
        debug!("[DASHBOARD] {key} = {value}");
    }

    fn put_number(&self, key: &str, value: f32) {
        debug!("[DASHBOARD] {key} = {value:.3}");
    }

    fn put_bool(&self, key: &str, value: bool) {
        debug!("[DASHBOARD] {key} = {value}");
    }
}
