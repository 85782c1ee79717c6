// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Startup wiring.
//!
//! [`Context`] owns the discovered device graph after configuration has been
//! attached to it, and is shared by every task through an `Arc`.

use crate::config::{Config, DaemonConfig};
use crate::control::{ControlLoop, never_stop_is_guaranteed};
use crate::device::{Controller, FILE_PLATFORM};
use crate::error::Error;
use crate::fans::{Fan, FileFan};
use crate::sensor::Sensor;
use crate::store::{BUCKET_FANS, SampleStore};
use crate::sysfs::clamp_pwm;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Context {
    pub controllers: Vec<Controller>,
    pub settings: DaemonConfig,
    pub store: Arc<dyn SampleStore>,
    /// Configured sensors by config id.
    sensors: HashMap<String, Arc<Sensor>>,
}

impl Context {
    /// Attach configuration to discovered devices and add file-backed fans.
    pub fn assemble(
        mut controllers: Vec<Controller>,
        config: &Config,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        let settings = config.daemon.clone();
        let mut sensors = HashMap::new();

        for controller in &controllers {
            for sensor in &controller.sensors {
                let Some(sensor_config) = config.find_sensor(&controller.platform, sensor.index)
                else {
                    log::info!(
                        "Ignoring unconfigured sensor {}/{}",
                        controller.platform,
                        sensor.name
                    );
                    continue;
                };
                let id = sensor_config.id.clone();
                sensor.attach_config(sensor_config.clone(), settings.temp_rolling_window_size);
                sensors.insert(id, Arc::clone(sensor));
            }

            for fan in &controller.fans {
                let fan_config = fan
                    .hardware_index()
                    .and_then(|index| config.find_hwmon_fan(&controller.platform, index));
                match fan_config {
                    Some(fan_config) => {
                        fan.attach_config(fan_config.clone());
                        restore_min_pwm(fan.as_ref(), store.as_ref());
                    }
                    None => log::info!("Ignoring unconfigured fan: {}", fan.id()),
                }
            }
        }

        let file_fans: Vec<Arc<dyn Fan>> = config
            .file_fans()
            .map(|(fan_config, path)| {
                let fan = FileFan::new(fan_config.id.clone(), path);
                fan.attach_config(fan_config.clone());
                Arc::new(fan) as Arc<dyn Fan>
            })
            .collect();
        if !file_fans.is_empty() {
            controllers.push(Controller {
                name: FILE_PLATFORM.to_string(),
                platform: FILE_PLATFORM.to_string(),
                path: PathBuf::new(),
                fans: file_fans,
                sensors: Vec::new(),
            });
        }

        let ctx = Self {
            controllers,
            settings,
            store,
            sensors,
        };

        for fan_config in &config.fans {
            if !ctx.fans().any(|f| f.config().is_some_and(|c| c.id == fan_config.id)) {
                log::warn!("Configured fan '{}' matches no device", fan_config.id);
            }
        }
        for fan in ctx.unguarded_never_stop_fans() {
            log::warn!(
                "Cannot guarantee never_stop on fan {}, since it has no RPM input",
                fan.id()
            );
        }
        for sensor_config in &config.sensors {
            if !ctx.sensors.contains_key(&sensor_config.id) {
                log::warn!("Configured sensor '{}' matches no device", sensor_config.id);
            }
        }

        ctx
    }

    /// Configured sensor by config id.
    pub fn sensor(&self, id: &str) -> Option<&Arc<Sensor>> {
        self.sensors.get(id)
    }

    /// All configured sensors.
    pub fn sensors(&self) -> impl Iterator<Item = &Arc<Sensor>> {
        self.sensors.values()
    }

    /// All fans, configured or not.
    pub fn fans(&self) -> impl Iterator<Item = &Arc<dyn Fan>> {
        self.controllers.iter().flat_map(|c| c.fans.iter())
    }

    /// Configured never-stop fans that have no learned floor and can still
    /// be driven to 0.
    pub fn unguarded_never_stop_fans(&self) -> impl Iterator<Item = &Arc<dyn Fan>> {
        self.fans()
            .filter(|f| f.config().is_some() && !never_stop_is_guaranteed(f.as_ref()))
    }

    /// One control loop per configured fan whose sensor resolved.
    pub fn control_loops(&self) -> Vec<ControlLoop> {
        let mut loops = Vec::new();
        for fan in self.fans() {
            let Some(fan_config) = fan.config() else {
                continue;
            };
            let Some(sensor) = self.sensor(&fan_config.sensor) else {
                let err = Error::UnknownSensor {
                    fan: fan_config.id.clone(),
                    sensor: fan_config.sensor.clone(),
                };
                log::error!("{err}");
                continue;
            };
            loops.push(ControlLoop::new(
                Arc::clone(fan),
                Arc::clone(sensor),
                Arc::clone(&self.store),
                &self.settings,
            ));
        }
        loops
    }

    /// Log the state of every device.
    pub fn log_status(&self) {
        for controller in &self.controllers {
            controller.log_status();
        }
    }
}

/// Apply a previously stored runtime minimum PWM, if any.
fn restore_min_pwm(fan: &dyn Fan, store: &dyn SampleStore) {
    let key = format!("{}_pwm_min", fan.id());
    let Ok(value) = store.read_sample(BUCKET_FANS, &key) else {
        return;
    };
    let mut bounds = fan.bounds();
    bounds.min = clamp_pwm(value).min(bounds.max);
    log::info!("Min PWM of {}: {}", fan.id(), bounds.min);
    fan.set_bounds(bounds);
}
