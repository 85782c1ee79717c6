// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fangov: closed-loop fan control for Linux hwmon devices.
//!
//! Temperatures are sampled into moving-average windows, every configured
//! fan learns its own PWM envelope with a one-shot duty-cycle sweep, and an
//! independent control loop per fan maps the averaged temperature onto that
//! envelope.

pub mod config;
pub mod context;
pub mod control;
pub mod curve;
pub mod device;
pub mod error;
pub mod fans;
pub mod hwmon;
pub mod sensor;
pub mod store;
pub mod sysfs;
pub mod telemetry;
pub mod window;

pub use error::{Error, Result};
