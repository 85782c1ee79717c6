// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! In-memory fan for tests.

use super::{Capability, Fan, PwmBounds};
use crate::config::{FanConfig, FanSource};
use crate::curve::FanCurveData;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A fan whose RPM is 0 below `stall_below` and `peak_rpm` from there on.
#[derive(Debug)]
pub(crate) struct MockFan {
    id: String,
    pwm: Mutex<u8>,
    mode: Mutex<u8>,
    writes: AtomicUsize,
    tachometer: Option<(u8, u32)>,
    refused_modes: Vec<u8>,
    fail_writes: AtomicBool,
    config: OnceLock<FanConfig>,
    bounds: Mutex<PwmBounds>,
    curve_data: FanCurveData,
}

impl MockFan {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            pwm: Mutex::new(0),
            mode: Mutex::new(2),
            writes: AtomicUsize::new(0),
            tachometer: None,
            refused_modes: Vec::new(),
            fail_writes: AtomicBool::new(false),
            config: OnceLock::new(),
            bounds: Mutex::new(PwmBounds::default()),
            curve_data: FanCurveData::new(3),
        }
    }

    pub fn with_tachometer(mut self, stall_below: u8, peak_rpm: u32) -> Self {
        self.tachometer = Some((stall_below, peak_rpm));
        self
    }

    pub fn refusing_modes(mut self, modes: &[u8]) -> Self {
        self.refused_modes = modes.to_vec();
        self
    }

    pub fn configured(self, sensor: &str, never_stop: bool) -> Self {
        self.attach_config(FanConfig {
            id: self.id.clone(),
            sensor: sensor.to_string(),
            curve: None,
            never_stop,
            source: FanSource::File {
                path: PathBuf::from("/dev/null"),
            },
        });
        self
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn accept_writes(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> u8 {
        *self.mode.lock()
    }
}

impl Fan for MockFan {
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
        Ok(*self.pwm.lock())
    }

    fn set_pwm(&self, pwm: u8) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Write {
                path: PathBuf::from(&self.id),
                value: pwm as i64,
                source: io::Error::other("device unplugged"),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.pwm.lock() = pwm;
        Ok(())
    }

    fn rpm(&self) -> Option<u32> {
        let (stall_below, peak) = self.tachometer?;
        let pwm = *self.pwm.lock();
        Some(if pwm < stall_below { 0 } else { peak })
    }

    fn pwm_mode(&self) -> Result<u8> {
        Ok(*self.mode.lock())
    }

    fn set_pwm_mode(&self, mode: u8) -> Result<()> {
        if self.refused_modes.contains(&mode) {
            return Err(Error::ModeStuck {
                fan: self.id.clone(),
                expected: mode,
                actual: *self.mode.lock() as i64,
            });
        }
        *self.mode.lock() = mode;
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
            Capability::RpmSensing => self.tachometer.is_some(),
        }
    }
}
