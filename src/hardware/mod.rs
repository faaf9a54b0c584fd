// Hardware backends for the drivetrain
//
// Builds a drivetrain from configuration, either on Feetech servos over a
// serial bus or on simulated wheels.

pub mod feetech;
pub mod servo;
pub mod sim;

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::{BackendConfig, DrivetrainConfig};
use crate::drivetrain::{DeviceError, Drivetrain, DrivetrainError, Encoder, Motor};
use feetech::FeetechBus;
use servo::{ServoEncoder, ServoMotor};
use sim::SimWheel;

pub type BoxedMotor = Box<dyn Motor + Send>;
pub type BoxedEncoder = Box<dyn Encoder + Send>;

/// Drivetrain over whichever backend the configuration selects
pub type DynDrivetrain = Drivetrain<BoxedMotor, BoxedEncoder>;

/// Acquire all four handles and build the drivetrain
///
/// Fails if any motor or encoder cannot be reached; the drivetrain never runs
/// with a missing wheel.
pub fn build(config: &DrivetrainConfig) -> Result<DynDrivetrain, DrivetrainError> {
    config.validate()?;

    match &config.backend {
        BackendConfig::Feetech {
            port,
            baudrate,
            supply_voltage,
        } => {
            info!("Connecting to servo bus on {} ({} baud)", port, baudrate);
            let bus = Arc::new(Mutex::new(
                FeetechBus::open(port, *baudrate).map_err(DeviceError::from)?,
            ));
            let scale = config.max_voltage / supply_voltage;

            let right_motor: BoxedMotor = Box::new(ServoMotor::connect(
                bus.clone(),
                config.right_motor_id,
                "right motor",
                scale,
            )?);
            let left_motor: BoxedMotor = Box::new(ServoMotor::connect(
                bus.clone(),
                config.left_motor_id,
                "left motor",
                scale,
            )?);
            let right_encoder: BoxedEncoder = Box::new(ServoEncoder::connect(
                bus.clone(),
                config.right_encoder_id,
                "right encoder",
            )?);
            let left_encoder: BoxedEncoder =
                Box::new(ServoEncoder::connect(bus, config.left_encoder_id, "left encoder")?);

            Drivetrain::new(config, right_motor, left_motor, right_encoder, left_encoder)
        }
        BackendConfig::Sim { counts_per_second } => {
            info!("Using simulated wheels ({} counts/s at full power)", counts_per_second);
            let (right, left) = sim_wheels(*counts_per_second);
            build_sim(config, &right, &left)
        }
    }
}

pub fn sim_wheels(counts_per_second: f64) -> (SimWheel, SimWheel) {
    (SimWheel::new(counts_per_second), SimWheel::new(counts_per_second))
}

/// Build on simulated wheels the caller keeps a handle to
pub fn build_sim(
    config: &DrivetrainConfig,
    right: &SimWheel,
    left: &SimWheel,
) -> Result<DynDrivetrain, DrivetrainError> {
    let right_motor: BoxedMotor = Box::new(right.motor());
    let left_motor: BoxedMotor = Box::new(left.motor());
    let right_encoder: BoxedEncoder = Box::new(right.encoder());
    let left_encoder: BoxedEncoder = Box::new(left.encoder());
    Drivetrain::new(config, right_motor, left_motor, right_encoder, left_encoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivetrain::Direction;
    use std::time::Duration;

    fn sim_config() -> DrivetrainConfig {
        DrivetrainConfig {
            backend: BackendConfig::Sim {
                counts_per_second: 20_000.0,
            },
            stall_timeout_ms: Some(2_000),
            poll_interval_us: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_sim_drive_reaches_target() {
        let config = sim_config();
        let (right, left) = sim_wheels(20_000.0);
        let mut drivetrain = build_sim(&config, &right, &left).unwrap();

        let summary = drivetrain.drive_forward(6.0, 50).unwrap();
        let target = drivetrain.units().distance_to_counts(6.0);
        assert_eq!(summary.target_counts, target);
        assert!(summary.progress >= target as f64);
        assert_eq!(right.power(), 0);
        assert_eq!(left.power(), 0);
    }

    #[test]
    fn test_sim_turn_then_stall() {
        let config = sim_config();
        let (right, left) = sim_wheels(20_000.0);
        let mut drivetrain = build_sim(&config, &right, &left).unwrap();

        drivetrain.turn(90.0, Direction::Left, 40).unwrap();

        right.set_jammed(true);
        left.set_jammed(true);
        let result = drivetrain.drive_forward(3.0, 40);
        assert!(matches!(result, Err(DrivetrainError::StallTimeout { .. })));
        assert_eq!(right.power(), 0);
        assert_eq!(left.power(), 0);
    }

    #[test]
    fn test_build_from_sim_config() {
        let mut drivetrain = build(&sim_config()).unwrap();
        let summary = drivetrain.drive_in_direction(2.0, 30.0, 60).unwrap();
        assert!(summary.target_counts > 0);
        assert!(drivetrain.settings().stall_timeout == Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_missing_serial_port_is_fatal() {
        let config = DrivetrainConfig {
            backend: BackendConfig::Feetech {
                port: "/dev/does-not-exist-feh".into(),
                baudrate: feetech::DEFAULT_BAUDRATE,
                supply_voltage: 12.0,
            },
            ..Default::default()
        };
        assert!(matches!(
            build(&config),
            Err(DrivetrainError::Device(DeviceError::Bus(_)))
        ));
    }
}
