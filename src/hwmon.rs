// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs discovery.
//!
//! Scans `/sys/class/hwmon/` for devices exposing PWM outputs or
//! temperature inputs and builds a [`Controller`] for each.

use crate::device::Controller;
use crate::fans::{Fan, HwmonFan};
use crate::sensor::Sensor;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default root of the hwmon class directory.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

const MAX_PWM_OUTPUTS: u32 = 16;
const MAX_TEMP_INPUTS: u32 = 32;

/// Scan `root` and return one controller per device with fans or sensors.
///
/// `rpm_window_size` sizes the per-duty RPM windows of discovered fans.
pub fn discover_controllers(root: &Path, rpm_window_size: usize) -> io::Result<Vec<Controller>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut controllers = Vec::new();
    for hwmon_dir in entries {
        let basename = hwmon_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = read_trimmed(&hwmon_dir.join("name")).unwrap_or_else(|| basename.clone());

        let fans = discover_fans(&hwmon_dir, &basename, rpm_window_size);
        let sensors = discover_sensors(&hwmon_dir);
        if fans.is_empty() && sensors.is_empty() {
            continue;
        }

        controllers.push(Controller {
            platform: name.clone(),
            name,
            path: hwmon_dir,
            fans,
            sensors,
        });
    }

    Ok(controllers)
}

/// Fans of one device: every `pwmN`, paired with `fanN_input` when present.
fn discover_fans(hwmon_dir: &Path, basename: &str, rpm_window_size: usize) -> Vec<Arc<dyn Fan>> {
    let mut fans: Vec<Arc<dyn Fan>> = Vec::new();

    for n in 1..=MAX_PWM_OUTPUTS {
        let pwm_path = hwmon_dir.join(format!("pwm{n}"));
        if !pwm_path.exists() {
            continue;
        }

        let label = read_trimmed(&hwmon_dir.join(format!("fan{n}_label")));
        let rpm_path = {
            let p = hwmon_dir.join(format!("fan{n}_input"));
            if p.exists() { Some(p) } else { None }
        };

        fans.push(Arc::new(HwmonFan::new(
            format!("{basename}/pwm{n}"),
            label,
            n,
            pwm_path,
            rpm_path,
            rpm_window_size,
        )));
    }

    fans
}

/// Sensors of one device: every `tempN_input`.
fn discover_sensors(hwmon_dir: &Path) -> Vec<Arc<Sensor>> {
    (1..=MAX_TEMP_INPUTS)
        .filter_map(|n| {
            let input = hwmon_dir.join(format!("temp{n}_input"));
            input
                .exists()
                .then(|| Arc::new(Sensor::new(format!("temp{n}_input"), n, input)))
        })
        .collect()
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
