// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Hardware monitoring chips and the fans and sensors they own.

use crate::fans::Fan;
use crate::sensor::Sensor;
use std::path::PathBuf;
use std::sync::Arc;

/// Platform tag of the virtual controller grouping file-backed fans.
pub const FILE_PLATFORM: &str = "file";

/// One hwmon device (or the virtual controller for file fans).
#[derive(Debug)]
pub struct Controller {
    /// Device name, e.g. "nct6798"
    pub name: String,
    /// Identifier used to match configuration entries.
    pub platform: String,
    /// Device directory, e.g. "/sys/class/hwmon/hwmon3"
    pub path: PathBuf,
    pub fans: Vec<Arc<dyn Fan>>,
    pub sensors: Vec<Arc<Sensor>>,
}

impl Controller {
    /// Log the live state of every fan and sensor.
    pub fn log_status(&self) {
        log::info!("Controller: {} ({})", self.name, self.path.display());
        for fan in &self.fans {
            let pwm = fan
                .pwm()
                .map(|p| p.to_string())
                .unwrap_or_else(|_| "?".to_string());
            let rpm = fan
                .rpm()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".to_string());
            let auto = fan.is_pwm_auto().unwrap_or(false);
            log::info!(
                "  Fan {} ({}): RPM: {rpm} PWM: {pwm} Auto: {auto} Curve: {}",
                fan.id(),
                fan.label(),
                fan.curve_id().unwrap_or("-")
            );
        }
        for sensor in &self.sensors {
            match sensor.read() {
                Ok(value) => log::info!("  Sensor {} ({}): {value}", sensor.index, sensor.name),
                Err(e) => log::info!("  Sensor {} ({}): {e}", sensor.index, sensor.name),
            }
        }
    }
}
