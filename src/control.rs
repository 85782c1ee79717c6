// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Per-fan control loop.
//!
//! Each configured fan runs its own [`ControlLoop`]:
//!
//! 1. **Enabling**: switch the output to manual mode (falling back to "no
//!    control" mode).
//! 2. **Learning**: sweep the duty from 0 to 254, sampling RPM at every
//!    step, and derive the fan's start and max PWM from what was observed.
//!    Fans without a tachometer skip this and keep their fixed bounds.
//! 3. **Steady**: on every tick, turn the averaged sensor temperature into
//!    a target speed and map it onto the fan's own PWM range.
//!
//! Failing to enable manual control or to write during the sweep ends the
//! loop for that fan only. Write failures in steady state are logged and
//! retried on the next tick.

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::fans::{Capability, Fan, PWM_MODE_MANUAL, PWM_MODE_NO_CONTROL};
use crate::sensor::Sensor;
use crate::store::{BUCKET_FANS, SampleStore};
use crate::sysfs::{MAX_PWM, MIN_PWM};
use crate::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// How long the learning sweep waits at each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepTiming {
    /// Extra wait at duty 0, so the fan spins down even from full speed.
    pub spin_down: Duration,
    /// Wait at every step before sampling RPM.
    pub settle: Duration,
}

impl Default for SweepTiming {
    fn default() -> Self {
        Self {
            spin_down: Duration::from_secs(3),
            // hwmon tachometers refresh about once a second, so this
            // under-samples slightly in exchange for a shorter sweep
            settle: Duration::from_millis(500),
        }
    }
}

impl SweepTiming {
    /// No waiting at all; for fans that react instantly.
    pub const fn immediate() -> Self {
        Self {
            spin_down: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Enabling,
    Learning,
    Steady,
    /// Terminal; the fan keeps its last commanded duty.
    Failed,
}

// ---------------------------------------------------------------------------
// PWM math
// ---------------------------------------------------------------------------

/// Target speed (0-255) for an average temperature between `min` and `max`
/// (all in milli-degrees).
///
/// At or above `max` is full speed, which also covers `min == max`.
pub fn target_speed(avg: f64, min: i64, max: i64) -> u8 {
    let (min, max) = (min as f64, max as f64);
    if avg >= max {
        return MAX_PWM;
    }
    if avg <= min {
        return MIN_PWM;
    }

    let ratio = (avg - min) / (max - min);
    (ratio * MAX_PWM as f64).round().clamp(0.0, MAX_PWM as f64) as u8
}

/// The `(min, max)` duty range a fan may be commanded within.
///
/// Never-stop fans use their learned start PWM as the floor.
pub fn effective_range(fan: &dyn Fan) -> (u8, u8) {
    let bounds = fan.bounds();
    let min = if fan.never_stop() {
        bounds.start
    } else {
        bounds.min
    };
    (min, bounds.max.max(min))
}

/// Whether a never-stop fan actually has a nonzero floor to hold it at.
///
/// Without a tachometer nothing is learned, so an hwmon fan keeps a start PWM
/// of 0 and can still be commanded off.
pub fn never_stop_is_guaranteed(fan: &dyn Fan) -> bool {
    !fan.never_stop() || fan.supports(Capability::RpmSensing) || fan.bounds().start > MIN_PWM
}

/// Map a 0-255 target speed linearly onto `[min, max]`.
pub fn map_to_range(target: u8, (min, max): (u8, u8)) -> u8 {
    let span = max.saturating_sub(min) as f64;
    let offset = (target as f64 / MAX_PWM as f64 * span).round() as u8;
    min.saturating_add(offset)
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// Drives a single fan from a single sensor.
pub struct ControlLoop {
    fan: Arc<dyn Fan>,
    sensor: Arc<Sensor>,
    store: Arc<dyn SampleStore>,
    tick: Duration,
    /// RPM samples taken at each sweep step.
    rpm_samples: usize,
    timing: SweepTiming,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(
        fan: Arc<dyn Fan>,
        sensor: Arc<Sensor>,
        store: Arc<dyn SampleStore>,
        settings: &DaemonConfig,
    ) -> Self {
        Self {
            fan,
            sensor,
            store,
            tick: settings.adjustment_tick_rate(),
            rpm_samples: settings.rpm_rolling_window_size,
            timing: SweepTiming::default(),
            state: LoopState::Enabling,
        }
    }

    pub fn with_timing(mut self, timing: SweepTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn fan(&self) -> &Arc<dyn Fan> {
        &self.fan
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the fan fails. Never returns otherwise.
    pub async fn run(mut self) -> LoopState {
        loop {
            match self.state {
                LoopState::Enabling => {
                    self.state = match self.enable() {
                        Ok(()) => LoopState::Learning,
                        Err(e) => {
                            log::error!("Could not enable fan control on {}: {e}", self.fan.id());
                            LoopState::Failed
                        }
                    };
                }
                LoopState::Learning => {
                    self.state = match self.learn().await {
                        Ok(()) => LoopState::Steady,
                        Err(e) => {
                            log::error!(
                                "Unable to run initialization sequence on {}: {e}",
                                self.fan.id()
                            );
                            LoopState::Failed
                        }
                    };
                }
                LoopState::Steady => {
                    let mut interval = time::interval(self.tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        interval.tick().await;
                        if let Err(e) = self.adjust() {
                            log::warn!("Error setting {}: {e}", self.fan.id());
                        }
                    }
                }
                LoopState::Failed => return LoopState::Failed,
            }
        }
    }

    /// Put the output under software control.
    pub fn enable(&mut self) -> Result<()> {
        if let Err(e) = self.fan.set_pwm_mode(PWM_MODE_MANUAL) {
            log::warn!(
                "{}: manual mode rejected ({e}), trying mode {PWM_MODE_NO_CONTROL}",
                self.fan.id()
            );
            self.fan.set_pwm_mode(PWM_MODE_NO_CONTROL)?;
        }
        Ok(())
    }

    /// Sweep the duty range and learn the fan's start and max PWM.
    pub async fn learn(&mut self) -> Result<()> {
        if !self.fan.supports(Capability::RpmSensing) {
            log::info!("{} has no RPM sensor, keeping fixed bounds", self.fan.id());
            return Ok(());
        }

        log::info!("Running initialization sequence for {}", self.fan.id());
        for pwm in MIN_PWM..MAX_PWM {
            self.fan.set_pwm(pwm)?;

            if pwm == MIN_PWM {
                time::sleep(self.timing.spin_down).await;
            }
            time::sleep(self.timing.settle).await;

            log::debug!("Measuring RPM of {} at PWM: {pwm}", self.fan.id());
            for _ in 0..self.rpm_samples {
                telemetry::measure_rpm(self.fan.as_ref(), pwm, self.store.as_ref());
            }
        }

        self.update_bounds();
        Ok(())
    }

    /// Derive start/max PWM from the curve data and store them if they changed.
    fn update_bounds(&self) {
        let (start, max) = self.fan.curve_data().derive_bounds();
        let mut bounds = self.fan.bounds();
        let before = bounds;

        if bounds.start != start {
            log::info!("Start PWM of {}: {start}", self.fan.id());
            bounds.start = start;
            self.persist("pwm_start", start);
        }
        if bounds.max != max {
            log::info!("Max PWM of {}: {max}", self.fan.id());
            bounds.max = max;
            self.persist("pwm_max", max);
        }
        bounds.min = bounds.min.min(bounds.max);

        if bounds != before {
            self.fan.set_bounds(bounds);
        }
    }

    fn persist(&self, suffix: &str, value: u8) {
        let key = format!("{}_{suffix}", self.fan.id());
        if let Err(e) = self.store.store_sample(BUCKET_FANS, &key, value as i64) {
            log::warn!("Failed to store {key}: {e}");
        }
    }

    /// Target speed for the sensor's current average.
    pub fn target(&self) -> u8 {
        match (self.sensor.config(), self.sensor.average()) {
            (Some(config), Some(avg)) => {
                target_speed(avg, config.min_millidegrees(), config.max_millidegrees())
            }
            _ => MAX_PWM,
        }
    }

    /// One steady-state step. Returns the written duty, or `None` when the
    /// fan is already there.
    pub fn adjust(&self) -> Result<Option<u8>> {
        let target = self.target();
        let command = map_to_range(target, effective_range(self.fan.as_ref()));

        match self.fan.pwm() {
            Ok(current) if current == command => return Ok(None),
            Ok(_) => {}
            Err(e) => log::debug!("Cannot read current PWM of {}: {e}", self.fan.id()),
        }

        log::debug!("Setting {} to {target} (mapped: {command})", self.fan.id());
        self.fan.set_pwm(command)?;
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::fans::PwmBounds;
    use crate::fans::mock::MockFan;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    /// Sensor thresholds 20-80°C with a one-sample window starting at `avg`.
    fn sensor_at(avg: i64) -> Arc<Sensor> {
        let sensor = Sensor::new("temp1_input".to_string(), 1, PathBuf::from("/nonexistent"));
        sensor.attach_config(
            SensorConfig {
                id: "cpu".to_string(),
                platform: "k10temp".to_string(),
                index: 1,
                min: 20,
                max: 80,
            },
            1,
        );
        sensor.record(avg);
        Arc::new(sensor)
    }

    fn control_loop(fan: Arc<MockFan>, sensor: Arc<Sensor>) -> ControlLoop {
        control_loop_with_store(fan, sensor, Arc::new(MemoryStore::new()))
    }

    fn control_loop_with_store(
        fan: Arc<MockFan>,
        sensor: Arc<Sensor>,
        store: Arc<MemoryStore>,
    ) -> ControlLoop {
        let settings = DaemonConfig {
            rpm_rolling_window_size: 2,
            controller_adjustment_tick_rate_ms: 5,
            ..DaemonConfig::default()
        };
        ControlLoop::new(fan, sensor, store, &settings).with_timing(SweepTiming::immediate())
    }

    #[test]
    fn test_target_speed() {
        assert_eq!(target_speed(20_000.0, 20_000, 80_000), 0);
        assert_eq!(target_speed(80_000.0, 20_000, 80_000), 255);
        assert_eq!(target_speed(50_000.0, 20_000, 80_000), 128);
        assert_eq!(target_speed(90_000.0, 20_000, 80_000), 255);
        assert_eq!(target_speed(10_000.0, 20_000, 80_000), 0);
    }

    #[test]
    fn test_target_speed_zero_width_range() {
        assert_eq!(target_speed(60_000.0, 60_000, 60_000), 255);
        assert_eq!(target_speed(59_999.0, 60_000, 60_000), 0);
    }

    #[test]
    fn test_target_speed_is_monotonic() {
        let mut last = 0;
        for avg in (0..100_000).step_by(250) {
            let t = target_speed(avg as f64, 20_000, 80_000);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_map_to_range() {
        assert_eq!(map_to_range(0, (0, 255)), 0);
        assert_eq!(map_to_range(255, (0, 255)), 255);
        assert_eq!(map_to_range(0, (40, 200)), 40);
        assert_eq!(map_to_range(255, (40, 200)), 200);
        assert_eq!(map_to_range(128, (40, 200)), 120);
        assert_eq!(map_to_range(200, (90, 90)), 90);
    }

    #[test]
    fn test_mapped_command_stays_within_range() {
        for min in (0..=255u8).step_by(15) {
            for max in (min..=255u8).step_by(20) {
                for target in 0..=255u8 {
                    let cmd = map_to_range(target, (min, max));
                    assert!(cmd >= min && cmd <= max, "{target} -> {cmd} in {min}..{max}");
                }
            }
        }
    }

    #[test]
    fn test_effective_range_never_stop() {
        let learned = PwmBounds {
            start: 40,
            min: 0,
            max: 220,
        };
        let normal = MockFan::new("normal").configured("cpu", false);
        normal.set_bounds(learned);
        assert_eq!(effective_range(&normal), (0, 220));

        let never_stop = MockFan::new("never_stop").configured("cpu", true);
        never_stop.set_bounds(learned);
        assert_eq!(effective_range(&never_stop), (40, 220));
    }

    #[test]
    fn test_never_stop_needs_a_floor() {
        let plain = MockFan::new("plain").configured("cpu", false);
        assert!(never_stop_is_guaranteed(&plain));

        let learnable = MockFan::new("learnable")
            .with_tachometer(30, 3000)
            .configured("cpu", true);
        assert!(never_stop_is_guaranteed(&learnable));

        let blind = MockFan::new("blind").configured("cpu", true);
        assert!(!never_stop_is_guaranteed(&blind));
        blind.set_bounds(PwmBounds {
            start: 1,
            min: 0,
            max: 255,
        });
        assert!(never_stop_is_guaranteed(&blind));
    }

    #[test]
    fn test_never_stop_fan_is_floored_at_start_pwm() {
        let fan = Arc::new(MockFan::new("fan").configured("cpu", true));
        fan.set_bounds(PwmBounds {
            start: 40,
            min: 0,
            max: 255,
        });
        let lp = control_loop(fan.clone(), sensor_at(5_000));
        assert_eq!(lp.target(), 0);
        assert_eq!(lp.adjust().unwrap(), Some(40));
        assert_eq!(fan.pwm().unwrap(), 40);
    }

    #[test]
    fn test_adjust_is_idempotent() {
        let fan = Arc::new(MockFan::new("fan").configured("cpu", false));
        let lp = control_loop(fan.clone(), sensor_at(50_000));

        assert_eq!(lp.adjust().unwrap(), Some(128));
        assert_eq!(fan.writes(), 1);
        assert_eq!(lp.adjust().unwrap(), None);
        assert_eq!(fan.writes(), 1);
    }

    #[test]
    fn test_steady_write_failure_is_reported() {
        let fan = Arc::new(MockFan::new("fan").configured("cpu", false));
        let lp = control_loop(fan.clone(), sensor_at(80_000));
        fan.fail_writes();
        assert!(lp.adjust().is_err());
    }

    /// Poll until `done` holds, giving up after a second.
    async fn wait_until(done: impl Fn() -> bool) {
        time::timeout(Duration::from_secs(1), async {
            while !done() {
                time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_steady_write_failure_keeps_the_loop_running() {
        let fan = Arc::new(
            MockFan::new("fan")
                .with_tachometer(30, 3000)
                .configured("cpu", false),
        );
        let sensor = sensor_at(80_000);
        let lp = control_loop(fan.clone(), Arc::clone(&sensor));
        let handle = tokio::spawn(lp.run());

        // learned range is 0..=30, so full speed settles at 30
        wait_until(|| fan.writes() > 255 && fan.pwm().unwrap() == 30).await;

        fan.fail_writes();
        sensor.record(20_000);
        time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        assert_eq!(fan.pwm().unwrap(), 30);

        // retried on a later tick once the output accepts writes again
        fan.accept_writes();
        wait_until(|| fan.pwm().unwrap() == 0).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_enable_falls_back_to_no_control() {
        let fan = Arc::new(MockFan::new("fan").refusing_modes(&[PWM_MODE_MANUAL]));
        let mut lp = control_loop(fan.clone(), sensor_at(30_000));
        lp.enable().unwrap();
        assert_eq!(fan.mode(), PWM_MODE_NO_CONTROL);
    }

    #[tokio::test]
    async fn test_enable_failure_fails_the_loop() {
        let fan = Arc::new(
            MockFan::new("fan")
                .with_tachometer(30, 3000)
                .refusing_modes(&[PWM_MODE_MANUAL, PWM_MODE_NO_CONTROL]),
        );
        let lp = control_loop(fan.clone(), sensor_at(30_000));
        assert_eq!(lp.state(), LoopState::Enabling);
        assert_eq!(lp.run().await, LoopState::Failed);
        assert_eq!(fan.writes(), 0);
    }

    #[tokio::test]
    async fn test_learning_finds_start_and_max() {
        let fan = Arc::new(MockFan::new("fan").with_tachometer(30, 3000));
        let store = Arc::new(MemoryStore::new());
        let mut lp = control_loop_with_store(fan.clone(), sensor_at(30_000), store.clone());
        lp.learn().await.unwrap();

        let bounds = fan.bounds();
        assert_eq!(bounds.start, 30);
        assert!((30..=255).contains(&bounds.max));
        // ties go to the first duty seen ascending
        assert_eq!(bounds.max, 30);
        assert_eq!(fan.curve_data().len(), 255);
        assert_eq!(fan.writes(), 255);
        assert_eq!(fan.pwm().unwrap(), 254);

        // both bounds moved off their defaults, so both are stored
        assert_eq!(store.read_sample(BUCKET_FANS, "fan_pwm_start").unwrap(), 30);
        assert_eq!(store.read_sample(BUCKET_FANS, "fan_pwm_max").unwrap(), 30);
        assert!(store.read_sample(BUCKET_FANS, "fan_pwm_min").is_err());
    }

    #[tokio::test]
    async fn test_learning_skipped_without_tachometer() {
        let fan = Arc::new(MockFan::new("fan"));
        let mut lp = control_loop(fan.clone(), sensor_at(30_000));
        lp.learn().await.unwrap();
        assert_eq!(fan.writes(), 0);
        assert!(fan.curve_data().is_empty());
        assert_eq!(fan.bounds(), PwmBounds::default());
    }

    #[tokio::test]
    async fn test_learning_write_failure_fails_the_loop() {
        let fan = Arc::new(MockFan::new("fan").with_tachometer(30, 3000));
        fan.fail_writes();
        let lp = control_loop(fan.clone(), sensor_at(30_000));
        assert_eq!(lp.run().await, LoopState::Failed);
        assert!(fan.curve_data().is_empty());
    }
}
