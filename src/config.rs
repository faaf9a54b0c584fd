// Calibration constants, topics, drivetrain configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivetrain::DrivetrainError;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "feh/cmd/drive"; // motion commands
pub const TOPIC_MOTION: &str = "feh/state/motion"; // per-command reports
pub const TOPIC_HEALTH: &str = "feh/state/health"; // health status

// Serial port for the Feetech servo bus
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

// IGUWAN encoder on a 3in wheel
pub const COUNTS_PER_ROTATION: u32 = 318;
pub const WHEEL_RADIUS_IN: f64 = 1.5;
pub const MAX_VOLTAGE: f64 = 9.0;

// Arc length per wheel for a 90° in-place turn (calibrated on the test chassis)
pub const TURN_BASE_DISTANCE_IN: f64 = 6.0;

// Give up on a motion that hasn't reached its target after this long
pub const STALL_TIMEOUT_MS: u64 = 10_000;

/// Where motor power goes and encoder counts come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Feetech STS servos in open-loop PWM mode
    Feetech {
        port: String,
        baudrate: u32,
        /// Servo supply voltage, used to scale power against `max_voltage`
        supply_voltage: f64,
    },
    /// Simulated wheels
    Sim {
        /// Encoder rate of each wheel at 100% power
        counts_per_second: f64,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Feetech {
            port: DEFAULT_PORT.to_string(),
            baudrate: crate::hardware::feetech::DEFAULT_BAUDRATE,
            supply_voltage: 12.0,
        }
    }
}

impl BackendConfig {
    pub fn sim() -> Self {
        BackendConfig::Sim {
            counts_per_second: 2000.0,
        }
    }
}

/// Construction-time configuration of the drivetrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub counts_per_rotation: u32,
    pub wheel_radius_in: f64,
    pub turn_base_distance_in: f64,
    pub max_voltage: f64,

    // Mounting orientation: an inverted motor spins backward for positive power
    pub right_motor_inverted: bool,
    pub left_motor_inverted: bool,

    // Servo ids on the bus
    pub right_motor_id: u8,
    pub left_motor_id: u8,
    pub right_encoder_id: u8,
    pub left_encoder_id: u8,

    /// Sleep between encoder polls; 0 spins
    pub poll_interval_us: u64,
    /// `None` waits forever
    pub stall_timeout_ms: Option<u64>,

    pub backend: BackendConfig,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            counts_per_rotation: COUNTS_PER_ROTATION,
            wheel_radius_in: WHEEL_RADIUS_IN,
            turn_base_distance_in: TURN_BASE_DISTANCE_IN,
            max_voltage: MAX_VOLTAGE,
            right_motor_inverted: true,
            left_motor_inverted: false,
            right_motor_id: 1,
            left_motor_id: 2,
            right_encoder_id: 1,
            left_encoder_id: 2,
            poll_interval_us: 0,
            stall_timeout_ms: Some(STALL_TIMEOUT_MS),
            backend: BackendConfig::default(),
        }
    }
}

impl DrivetrainConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DrivetrainError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DrivetrainError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, DrivetrainError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| DrivetrainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DrivetrainError> {
        if self.counts_per_rotation == 0 {
            return Err(DrivetrainError::Config("counts_per_rotation must be > 0".into()));
        }
        if !(self.wheel_radius_in > 0.0) {
            return Err(DrivetrainError::Config("wheel_radius_in must be > 0".into()));
        }
        if !(self.max_voltage > 0.0) {
            return Err(DrivetrainError::Config("max_voltage must be > 0".into()));
        }
        if let BackendConfig::Feetech { supply_voltage, .. } = &self.backend {
            if !(*supply_voltage > 0.0) {
                return Err(DrivetrainError::Config("supply_voltage must be > 0".into()));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }
}
