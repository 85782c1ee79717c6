// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Learned fan curves.
//!
//! A [`FanCurveData`] maps each visited PWM duty value (0-255) to a moving
//! window of the RPM observed at that duty. It is filled during the
//! learning sweep and by the RPM telemetry tick, and is only consulted to
//! derive a fan's start and max PWM.

use crate::sysfs::{MAX_PWM, MIN_PWM};
use crate::window::RollingWindow;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Per-duty RPM observations of a single fan. Safe to share between tasks.
#[derive(Debug)]
pub struct FanCurveData {
    buckets: Mutex<BTreeMap<u8, RollingWindow>>,
    window_size: usize,
}

impl FanCurveData {
    /// Create empty curve data whose buckets hold `window_size` samples each.
    pub fn new(window_size: usize) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            window_size,
        }
    }

    /// Record an RPM sample for a duty value, creating its bucket on first visit.
    pub fn record(&self, pwm: u8, rpm: u32) {
        let mut buckets = self.buckets.lock();
        buckets
            .entry(pwm)
            .or_insert_with(|| RollingWindow::new(self.window_size))
            .append(rpm as f64);
    }

    /// Mean RPM per visited duty value, ascending by duty.
    pub fn means(&self) -> Vec<(u8, f64)> {
        self.buckets
            .lock()
            .iter()
            .map(|(pwm, window)| (*pwm, window.mean()))
            .collect()
    }

    /// Number of duty values visited so far.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Derive `(start_pwm, max_pwm)` from the recorded data.
    ///
    /// - start: lowest duty with a nonzero mean RPM, 0 if none spun
    /// - max: duty with the highest mean RPM, first one wins on ties,
    ///   255 if nothing spun
    pub fn derive_bounds(&self) -> (u8, u8) {
        let mut start = None;
        let mut max_pwm = MAX_PWM;
        let mut max_rpm = 0.0;

        for (pwm, avg) in self.means() {
            if avg > 0.0 && start.is_none() {
                start = Some(pwm);
            }
            if avg > max_rpm {
                max_rpm = avg;
                max_pwm = pwm;
            }
        }

        (start.unwrap_or(MIN_PWM), max_pwm)
    }
}
