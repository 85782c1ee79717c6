// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Periodic sampling of temperatures and fan speeds.
//!
//! Temperatures feed the sensor windows the control loops average over.
//! RPM samples feed each fan's curve data, keyed by the fan's current duty.

use crate::context::Context;
use crate::error::Result;
use crate::fans::{Capability, Fan};
use crate::sensor::Sensor;
use crate::store::{BUCKET_FANS, BUCKET_SENSORS, SampleStore};
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};

/// Run both sampling tickers forever.
pub async fn run(ctx: Arc<Context>) {
    let mut temp_tick = time::interval(ctx.settings.temp_polling_rate());
    let mut rpm_tick = time::interval(ctx.settings.rpm_polling_rate());
    temp_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    rpm_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = temp_tick.tick() => {
                measure_temperatures(&ctx);
            }
            _ = rpm_tick.tick() => {
                measure_rpms(&ctx);
                if let Err(e) = ctx.store.flush() {
                    log::warn!("Failed to flush sample store: {e}");
                }
            }
        }
    }
}

/// Sample every configured sensor once.
pub fn measure_temperatures(ctx: &Context) {
    for sensor in ctx.sensors() {
        if let Err(e) = update_sensor(sensor, ctx.store.as_ref()) {
            log::warn!("Error reading sensor {}: {e}", sensor.input.display());
        }
    }
}

/// Read a sensor, push the value into its window and store it.
pub fn update_sensor(sensor: &Sensor, store: &dyn SampleStore) -> Result<i64> {
    let value = sensor.read()?;
    sensor.record(value);

    let key = sensor.input.to_string_lossy();
    if let Err(e) = store.store_sample(BUCKET_SENSORS, &key, value) {
        log::warn!("Failed to store reading of {key}: {e}");
    }
    Ok(value)
}

/// Sample the speed of every fan with a tachometer once.
///
/// Returns the ids of fans whose tachometer could not be read.
pub fn measure_rpms(ctx: &Context) -> Vec<String> {
    let mut unreadable = Vec::new();
    for fan in ctx.fans() {
        if !fan.supports(Capability::RpmSensing) {
            continue;
        }
        let pwm = match fan.pwm() {
            Ok(pwm) => pwm,
            Err(e) => {
                log::warn!("Error measuring RPM of {}: {e}", fan.id());
                continue;
            }
        };

        if let Err(e) = ctx
            .store
            .store_sample(BUCKET_FANS, &format!("{}_pwm", fan.id()), pwm as i64)
        {
            log::warn!("Failed to store PWM of {}: {e}", fan.id());
        }
        if measure_rpm(fan.as_ref(), pwm, ctx.store.as_ref()).is_none() {
            log::warn!("Error measuring RPM of {}: no reading", fan.id());
            unreadable.push(fan.id().to_string());
        }
    }
    unreadable
}

/// Read a fan's RPM and record it under `pwm` in its curve data.
///
/// Returns `None` (and records nothing) when the speed can't be read.
pub fn measure_rpm(fan: &dyn Fan, pwm: u8, store: &dyn SampleStore) -> Option<u32> {
    let Some(rpm) = fan.rpm() else {
        log::debug!("No RPM reading from {} at PWM {pwm}", fan.id());
        return None;
    };
    fan.curve_data().record(pwm, rpm);

    let key = format!("{}_rpm", fan.id());
    if let Err(e) = store.store_sample(BUCKET_SENSORS, &key, rpm as i64) {
        log::warn!("Failed to store RPM of {}: {e}", fan.id());
    }
    Some(rpm)
}
