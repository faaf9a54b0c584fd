use std::time::Duration;

use crate::hardware::feetech::FeetechError;

/// Failures reported by a motor or encoder handle
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Servo bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Device {name} is not responding")]
    Unavailable { name: String },

    #[error("Servo bus lock poisoned by a panicked thread")]
    BusPoisoned,
}

/// Failures of a motion command
#[derive(Debug, thiserror::Error)]
pub enum DrivetrainError {
    #[error("Power {0}% is outside [-100, 100]")]
    InvalidPercent(i32),

    #[error("Stalled after {elapsed:?}: progress {progress} of {target} counts")]
    StallTimeout {
        target: i64,
        progress: f64,
        elapsed: Duration,
    },

    #[error("Motion aborted")]
    Aborted,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
