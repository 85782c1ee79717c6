// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sensors and their moving-average windows.

use crate::config::SensorConfig;
use crate::error::Result;
use crate::sysfs;
use crate::window::RollingWindow;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Reading used to seed a window when the sensor can't be read at startup (50°C).
pub const FALLBACK_READING: i64 = 50_000;

/// A `tempN_input` file of an hwmon device.
///
/// Inert until a [`SensorConfig`] is attached: no window, never sampled.
#[derive(Debug)]
pub struct Sensor {
    /// File name, e.g. "temp1_input"
    pub name: String,
    /// N in `tempN_input`
    pub index: u32,
    pub input: PathBuf,
    binding: OnceLock<Binding>,
}

#[derive(Debug)]
struct Binding {
    config: SensorConfig,
    window: Mutex<RollingWindow>,
}

impl Sensor {
    pub fn new(name: String, index: u32, input: PathBuf) -> Self {
        Self {
            name,
            index,
            input,
            binding: OnceLock::new(),
        }
    }

    pub fn config(&self) -> Option<&SensorConfig> {
        self.binding.get().map(|b| &b.config)
    }

    /// Attach configuration and seed a window of `window_size` with the current
    /// reading. Returns false if the sensor was already configured.
    pub fn attach_config(&self, config: SensorConfig, window_size: usize) -> bool {
        let seed = match self.read() {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "Sensor {}: {e}, seeding window with {FALLBACK_READING}",
                    config.id
                );
                FALLBACK_READING
            }
        };

        let mut window = RollingWindow::new(window_size);
        for _ in 0..window.capacity() {
            window.append(seed as f64);
        }

        self.binding
            .set(Binding {
                config,
                window: Mutex::new(window),
            })
            .is_ok()
    }

    /// Read the instantaneous value in milli-degrees.
    pub fn read(&self) -> Result<i64> {
        sysfs::read_int(&self.input)
    }

    /// Push a reading into the window.
    ///
    /// Readings above the configured max are pushed twice so spikes pull the
    /// average up faster. Returns false when the sensor is unconfigured.
    pub fn record(&self, value: i64) -> bool {
        let Some(binding) = self.binding.get() else {
            return false;
        };

        let mut window = binding.window.lock();
        window.append(value as f64);
        if value > binding.config.max_millidegrees() {
            window.append(value as f64);
        }
        true
    }

    /// Mean of the window in milli-degrees, `None` when unconfigured.
    pub fn average(&self) -> Option<f64> {
        self.binding.get().map(|b| b.window.lock().mean())
    }
}
