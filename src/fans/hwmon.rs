// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fans exposed as `pwmN` / `fanN_input` pairs of an hwmon device.

use super::{Capability, Fan, PwmBounds};
use crate::config::FanConfig;
use crate::curve::FanCurveData;
use crate::error::{Error, Result};
use crate::sysfs::{self, clamp_pwm};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// A PWM output of an hwmon device, optionally paired with a tachometer.
#[derive(Debug)]
pub struct HwmonFan {
    /// Hardware id, e.g. "hwmon3/pwm1"
    name: String,
    label: String,
    /// N in `pwmN`
    index: u32,
    pwm_path: PathBuf,
    pwm_enable_path: PathBuf,
    rpm_path: Option<PathBuf>,
    config: OnceLock<FanConfig>,
    bounds: Mutex<PwmBounds>,
    curve_data: FanCurveData,
}

impl HwmonFan {
    pub fn new(
        name: String,
        label: Option<String>,
        index: u32,
        pwm_path: PathBuf,
        rpm_path: Option<PathBuf>,
        rpm_window_size: usize,
    ) -> Self {
        let mut enable = pwm_path.clone().into_os_string();
        enable.push("_enable");
        let pwm_enable_path = PathBuf::from(enable);
        Self {
            label: label.unwrap_or_else(|| name.clone()),
            name,
            index,
            pwm_path,
            pwm_enable_path,
            rpm_path,
            config: OnceLock::new(),
            bounds: Mutex::new(PwmBounds::default()),
            curve_data: FanCurveData::new(rpm_window_size),
        }
    }
}

impl Fan for HwmonFan {
    fn id(&self) -> &str {
        self.config
            .get()
            .map(|c| c.id.as_str())
            .unwrap_or(&self.name)
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn hardware_index(&self) -> Option<u32> {
        Some(self.index)
    }

    fn config(&self) -> Option<&FanConfig> {
        self.config.get()
    }

    fn attach_config(&self, config: FanConfig) -> bool {
        self.config.set(config).is_ok()
    }

    fn pwm(&self) -> Result<u8> {
        sysfs::read_int(&self.pwm_path).map(clamp_pwm)
    }

    fn set_pwm(&self, pwm: u8) -> Result<()> {
        log::debug!("Setting PWM of {} to {pwm}", self.id());
        sysfs::write_int(pwm as i64, &self.pwm_path)
    }

    fn rpm(&self) -> Option<u32> {
        let path = self.rpm_path.as_ref()?;
        match sysfs::read_int(path) {
            Ok(rpm) => u32::try_from(rpm).ok(),
            Err(e) => {
                log::debug!("{}: {e}", self.id());
                None
            }
        }
    }

    fn pwm_mode(&self) -> Result<u8> {
        sysfs::read_int(&self.pwm_enable_path).map(clamp_pwm)
    }

    fn set_pwm_mode(&self, mode: u8) -> Result<()> {
        sysfs::write_int(mode as i64, &self.pwm_enable_path)?;
        let actual = sysfs::read_int(&self.pwm_enable_path)?;
        if actual != mode as i64 {
            return Err(Error::ModeStuck {
                fan: self.id().to_string(),
                expected: mode,
                actual,
            });
        }
        Ok(())
    }

    fn bounds(&self) -> PwmBounds {
        *self.bounds.lock()
    }

    fn set_bounds(&self, bounds: PwmBounds) {
        *self.bounds.lock() = bounds;
    }

    fn curve_data(&self) -> &FanCurveData {
        &self.curve_data
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::RpmSensing => self
                .rpm_path
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fans::{PWM_MODE_AUTO, PWM_MODE_MANUAL};
    use std::fs;
    use tempfile::TempDir;

    fn fake_fan(dir: &TempDir, with_rpm: bool) -> HwmonFan {
        let pwm = dir.path().join("pwm1");
        fs::write(&pwm, "80\n").unwrap();
        fs::write(dir.path().join("pwm1_enable"), "2\n").unwrap();
        let rpm = with_rpm.then(|| {
            let p = dir.path().join("fan1_input");
            fs::write(&p, "1200\n").unwrap();
            p
        });
        HwmonFan::new("hwmon0/pwm1".to_string(), None, 1, pwm, rpm, 4)
    }

    #[test]
    fn test_rpm_capability_follows_tachometer() {
        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, true);
        assert!(fan.supports(Capability::RpmSensing));
        assert_eq!(fan.rpm(), Some(1200));

        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, false);
        assert!(!fan.supports(Capability::RpmSensing));
        assert_eq!(fan.rpm(), None);
    }

    #[test]
    fn test_pwm_read_write() {
        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, true);
        assert_eq!(fan.pwm().unwrap(), 80);
        fan.set_pwm(200).unwrap();
        assert_eq!(fan.pwm().unwrap(), 200);
    }

    #[test]
    fn test_mode_switch_verifies_readback() {
        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, true);
        assert!(fan.is_pwm_auto().unwrap());
        fan.set_pwm_mode(PWM_MODE_MANUAL).unwrap();
        assert_eq!(fan.pwm_mode().unwrap(), PWM_MODE_MANUAL);
        assert!(!fan.is_pwm_auto().unwrap());
        fan.set_pwm_mode(PWM_MODE_AUTO).unwrap();
        assert!(fan.is_pwm_auto().unwrap());
    }

    #[test]
    fn test_missing_enable_file_fails_mode_switch() {
        let dir = TempDir::new().unwrap();
        let pwm = dir.path().join("nodir").join("pwm1");
        let fan = HwmonFan::new("x/pwm1".to_string(), None, 1, pwm, None, 4);
        assert!(fan.set_pwm_mode(PWM_MODE_MANUAL).is_err());
    }

    #[test]
    fn test_id_prefers_config() {
        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, true);
        assert_eq!(fan.id(), "hwmon0/pwm1");
        assert_eq!(fan.label(), "hwmon0/pwm1");
        assert_eq!(fan.curve_id(), None);
        let attached = fan.attach_config(FanConfig {
            id: "cpu_fan".to_string(),
            sensor: "cpu".to_string(),
            curve: Some("silent".to_string()),
            never_stop: true,
            source: crate::config::FanSource::Hwmon {
                platform: "nct".to_string(),
                index: 1,
            },
        });
        assert!(attached);
        assert_eq!(fan.id(), "cpu_fan");
        assert_eq!(fan.curve_id(), Some("silent"));
        assert!(fan.never_stop());
    }

    #[test]
    fn test_bounds_update() {
        let dir = TempDir::new().unwrap();
        let fan = fake_fan(&dir, true);
        assert_eq!(fan.bounds(), PwmBounds::default());
        let learned = PwmBounds {
            start: 40,
            min: 0,
            max: 230,
        };
        fan.set_bounds(learned);
        assert_eq!(fan.bounds(), learned);
    }
}
