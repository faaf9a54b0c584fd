// Differential drivetrain for a two-wheeled robot
//
// Provides:
// - Encoder count math (inches / degrees -> pulse targets)
// - Motor and encoder pair abstractions over capability traits
// - Drive-and-wait motion primitives with stall timeout and abort

mod controller;
mod direction;
mod encoders;
mod error;
mod motors;
pub mod units;

pub use controller::{normalize_heading, AbortHandle, ControlSettings, Drivetrain, MotionSummary};
pub use direction::Direction;
pub use encoders::{Encoder, EncoderPair};
pub use error::{DeviceError, DrivetrainError};
pub use motors::{Motor, MotorPair, MAX_PERCENT};
pub use units::UnitConverter;
