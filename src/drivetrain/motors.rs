// Right/left motor pair
//
// Raw commands go straight to the actuators; chassis-frame commands apply each
// motor's mounting inversion first.

use tracing::{debug, warn};

use super::error::{DeviceError, DrivetrainError};

/// A single actuator that accepts a signed power percentage
pub trait Motor {
    /// Command power in percent of max voltage, -100..=100
    fn set_power(&mut self, percent: i32) -> Result<(), DeviceError>;

    /// Remove power
    fn stop(&mut self) -> Result<(), DeviceError>;
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn set_power(&mut self, percent: i32) -> Result<(), DeviceError> {
        (**self).set_power(percent)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }
}

pub const MAX_PERCENT: i32 = 100;

/// Reject power outside -100..=100
pub(crate) fn check_percent(percent: i32) -> Result<(), DrivetrainError> {
    if !(-MAX_PERCENT..=MAX_PERCENT).contains(&percent) {
        return Err(DrivetrainError::InvalidPercent(percent));
    }
    Ok(())
}

/// Owns both drive motors
pub struct MotorPair<M> {
    right: M,
    left: M,
    right_inverted: bool,
    left_inverted: bool,
}

impl<M: Motor> MotorPair<M> {
    pub fn new(right: M, left: M, right_inverted: bool, left_inverted: bool) -> Self {
        Self {
            right,
            left,
            right_inverted,
            left_inverted,
        }
    }

    /// Command both motors with raw percentages (no inversion applied)
    pub fn set_percent(&mut self, right: i32, left: i32) -> Result<(), DrivetrainError> {
        check_percent(right)?;
        check_percent(left)?;

        debug!("Setting motor power: right={}%, left={}%", right, left);
        self.right.set_power(right)?;
        self.left.set_power(left)?;
        Ok(())
    }

    /// Command both wheels in the chassis frame, positive = forward for that wheel
    pub fn set_wheel_percent(&mut self, right: i32, left: i32) -> Result<(), DrivetrainError> {
        check_percent(right)?;
        check_percent(left)?;
        let right = if self.right_inverted { -right } else { right };
        let left = if self.left_inverted { -left } else { left };
        self.set_percent(right, left)
    }

    /// Stop both motors. The left motor is still stopped if the right one fails.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        let right = self.right.stop();
        let left = self.left.stop();

        if let Err(ref e) = right {
            warn!("Failed to stop right motor: {}", e);
        }
        if let Err(ref e) = left {
            warn!("Failed to stop left motor: {}", e);
        }
        right.and(left)
    }
}
