// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan backends.
//!
//! The learning sweep and the control loop only talk to the [`Fan`] trait
//! and ask [`Fan::supports`] before doing anything capability-specific, so
//! a new backend only has to implement the trait.

pub mod file;
pub mod hwmon;
#[cfg(test)]
pub(crate) mod mock;

pub use file::FileFan;
pub use hwmon::HwmonFan;

use crate::config::FanConfig;
use crate::curve::FanCurveData;
use crate::error::Result;
use crate::sysfs::{MAX_PWM, MIN_PWM};
use std::fmt;

/// `pwmN_enable` values.
///   0 = no control (full speed on most chips)
///   1 = manual PWM control
///   2+ = automatic (BIOS/firmware) control
pub const PWM_MODE_NO_CONTROL: u8 = 0;
pub const PWM_MODE_MANUAL: u8 = 1;
pub const PWM_MODE_AUTO: u8 = 2;

/// Optional behaviour a backend may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The fan reports its speed in RPM.
    RpmSensing,
}

/// The duty envelope of a fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmBounds {
    /// Lowest duty at which the fan was seen rotating. Only meaningful after learning.
    pub start: u8,
    /// Lowest duty usable at runtime.
    pub min: u8,
    /// Duty yielding the highest RPM.
    pub max: u8,
}

impl Default for PwmBounds {
    fn default() -> Self {
        Self {
            start: MIN_PWM,
            min: MIN_PWM,
            max: MAX_PWM,
        }
    }
}

/// A controllable fan.
///
/// Methods take `&self`; implementations keep mutable state behind locks
/// because a fan is shared between its control loop and the telemetry task.
pub trait Fan: Send + Sync + fmt::Debug {
    /// Stable identifier (the config id once attached).
    fn id(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str;

    /// N of the hardware output, for matching configuration. `None` for
    /// fans that are not discovered from hardware.
    fn hardware_index(&self) -> Option<u32> {
        None
    }

    /// Configuration, if one matched this fan.
    fn config(&self) -> Option<&FanConfig>;

    /// Attach configuration. Returns false if one was already attached.
    fn attach_config(&self, config: FanConfig) -> bool;

    /// Current duty value.
    fn pwm(&self) -> Result<u8>;

    fn set_pwm(&self, pwm: u8) -> Result<()>;

    /// Current speed, `None` when unknown or unsupported.
    fn rpm(&self) -> Option<u32>;

    /// Current `pwm_enable` mode.
    fn pwm_mode(&self) -> Result<u8>;

    /// Switch the control mode, verifying the hardware accepted it.
    fn set_pwm_mode(&self, mode: u8) -> Result<()>;

    fn is_pwm_auto(&self) -> Result<bool> {
        Ok(self.pwm_mode()? >= PWM_MODE_AUTO)
    }

    fn bounds(&self) -> PwmBounds;

    /// Store new bounds. Backends with fixed bounds ignore this.
    fn set_bounds(&self, bounds: PwmBounds);

    /// RPM observations per duty value.
    fn curve_data(&self) -> &FanCurveData;

    fn supports(&self, capability: Capability) -> bool;

    fn curve_id(&self) -> Option<&str> {
        self.config().and_then(|c| c.curve.as_deref())
    }

    fn never_stop(&self) -> bool {
        self.config().is_some_and(|c| c.never_stop)
    }
}
