// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error type shared by the library.

use std::io;
use std::path::PathBuf;

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {value} to {path}: {source}")]
    Write {
        path: PathBuf,
        value: i64,
        source: io::Error,
    },

    #[error("Invalid integer {content:?} in {path}")]
    Parse { path: PathBuf, content: String },

    /// The enable file accepted the write but reads back a different mode.
    #[error("PWM mode of {fan} stuck at {actual} (wanted {expected})")]
    ModeStuck {
        fan: String,
        expected: u8,
        actual: i64,
    },

    #[error("Sample store error: {reason}")]
    Store { reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fan {fan} references unknown sensor {sensor}")]
    UnknownSensor { fan: String, sensor: String },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store {
            reason: e.to_string(),
        }
    }
}
