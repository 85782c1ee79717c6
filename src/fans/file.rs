// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fans whose duty value is written to an arbitrary file.
//!
//! Used for virtual or software-controlled outputs. There is no RPM
//! feedback, so nothing can be learned and the bounds are fixed.

use super::{Capability, Fan, PWM_MODE_MANUAL, PwmBounds};
use crate::config::FanConfig;
use crate::curve::FanCurveData;
use crate::error::Result;
use crate::sysfs::{self, MAX_PWM, MIN_PWM, clamp_pwm};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Bounds of every file fan.
pub const FILE_FAN_BOUNDS: PwmBounds = PwmBounds {
    start: 1,
    min: MIN_PWM,
    max: MAX_PWM,
};

#[derive(Debug)]
pub struct FileFan {
    id: String,
    path: PathBuf,
    config: OnceLock<FanConfig>,
    curve_data: FanCurveData,
}

impl FileFan {
    /// Create a file fan. A leading `~` in `path` is expanded to the home directory.
    pub fn new(id: String, path: &Path) -> Self {
        Self {
            id,
            path: expand_home(path),
            config: OnceLock::new(),
            curve_data: FanCurveData::new(1),
        }
    }
}

impl Fan for FileFan {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.id
    }

    fn config(&self) -> Option<&FanConfig> {
        self.config.get()
    }

    fn attach_config(&self, config: FanConfig) -> bool {
        self.config.set(config).is_ok()
    }

    fn pwm(&self) -> Result<u8> {
        sysfs::read_int(&self.path).map(clamp_pwm)
    }

    fn set_pwm(&self, pwm: u8) -> Result<()> {
        log::debug!("Writing PWM {pwm} of {} to {}", self.id, self.path.display());
        sysfs::write_int(pwm as i64, &self.path)
    }

    fn rpm(&self) -> Option<u32> {
        None
    }

    fn pwm_mode(&self) -> Result<u8> {
        Ok(PWM_MODE_MANUAL)
    }

    fn set_pwm_mode(&self, _mode: u8) -> Result<()> {
        Ok(())
    }

    fn bounds(&self) -> PwmBounds {
        FILE_FAN_BOUNDS
    }

    fn set_bounds(&self, _bounds: PwmBounds) {}

    fn curve_data(&self) -> &FanCurveData {
        &self.curve_data
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::RpmSensing => false,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
