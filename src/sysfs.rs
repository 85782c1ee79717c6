// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Integer read/write against sysfs-style attribute files.
//!
//! Every sensing and actuation path in the daemon funnels through
//! [`read_int`] and [`write_int`].

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Lowest PWM duty value.
pub const MIN_PWM: u8 = 0;

/// Highest PWM duty value.
pub const MAX_PWM: u8 = 255;

/// Read a decimal integer from a file, ignoring surrounding whitespace.
pub fn read_int(path: &Path) -> Result<i64> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = contents.trim();
    trimmed.parse::<i64>().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        content: trimmed.to_string(),
    })
}

/// Write a decimal integer to a file.
pub fn write_int(value: i64, path: &Path) -> Result<()> {
    fs::write(path, format!("{value}")).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        value,
        source,
    })
}

/// Clamp a raw value into the PWM duty range.
pub fn clamp_pwm(value: i64) -> u8 {
    value.clamp(MIN_PWM as i64, MAX_PWM as i64) as u8
}
