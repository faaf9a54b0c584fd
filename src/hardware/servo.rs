// Wheel motor and encoder capabilities on Feetech servos in open-loop mode
//
// One servo per wheel: the PWM register drives it like a DC gearmotor and its
// absolute position sensor is turned into an incremental pulse count.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, PWM_FULL_SCALE, STEPS_PER_REVOLUTION};
use crate::drivetrain::{DeviceError, Encoder, Motor};

pub type SharedBus = Arc<Mutex<FeetechBus>>;

fn lock(bus: &SharedBus) -> Result<MutexGuard<'_, FeetechBus>, DeviceError> {
    bus.lock().map_err(|_| DeviceError::BusPoisoned)
}

fn require(bus: &SharedBus, id: u8, name: &str) -> Result<(), DeviceError> {
    if lock(bus)?.ping(id)? {
        debug!("{} (servo {}) responding", name, id);
        Ok(())
    } else {
        warn!("{} (servo {}) not responding to ping", name, id);
        Err(DeviceError::Unavailable {
            name: format!("{} (servo {})", name, id),
        })
    }
}

/// Convert power percent into a PWM duty, scaled so 100% equals `max_voltage`
fn percent_to_duty(percent: i32, voltage_scale: f64) -> i16 {
    (percent as f64 / 100.0 * PWM_FULL_SCALE as f64 * voltage_scale).round() as i16
}

/// Signed shortest step between two absolute positions on the 4096-step circle
fn wrapped_delta(previous: u16, current: u16) -> i32 {
    let steps = STEPS_PER_REVOLUTION as i32;
    let delta = current as i32 - previous as i32;
    if delta > steps / 2 {
        delta - steps
    } else if delta <= -steps / 2 {
        delta + steps
    } else {
        delta
    }
}

pub struct ServoMotor {
    bus: SharedBus,
    id: u8,
    voltage_scale: f64,
}

impl ServoMotor {
    /// Ping the servo and switch it to PWM mode
    ///
    /// `voltage_scale` is max drive voltage over supply voltage, capped at 1.
    pub fn connect(bus: SharedBus, id: u8, name: &str, voltage_scale: f64) -> Result<Self, DeviceError> {
        require(&bus, id, name)?;
        lock(&bus)?.configure_pwm_mode(id)?;
        info!("{} on servo {} in PWM mode", name, id);
        Ok(Self {
            bus,
            id,
            voltage_scale: voltage_scale.clamp(0.0, 1.0),
        })
    }
}

impl Motor for ServoMotor {
    fn set_power(&mut self, percent: i32) -> Result<(), DeviceError> {
        let duty = percent_to_duty(percent, self.voltage_scale);
        lock(&self.bus)?.set_pwm(self.id, duty)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        lock(&self.bus)?.set_pwm(self.id, 0)?;
        Ok(())
    }
}

impl Drop for ServoMotor {
    fn drop(&mut self) {
        // Never leave a wheel powered
        if let Err(e) = self.stop() {
            warn!("Failed to stop servo {} on drop: {}", self.id, e);
        }
    }
}

pub struct ServoEncoder {
    bus: SharedBus,
    id: u8,
    last_position: u16,
    count: u64,
}

impl ServoEncoder {
    pub fn connect(bus: SharedBus, id: u8, name: &str) -> Result<Self, DeviceError> {
        require(&bus, id, name)?;
        let last_position = lock(&bus)?.position(id)?;
        Ok(Self {
            bus,
            id,
            last_position,
            count: 0,
        })
    }
}

impl Encoder for ServoEncoder {
    fn reset_count(&mut self) -> Result<(), DeviceError> {
        self.last_position = lock(&self.bus)?.position(self.id)?;
        self.count = 0;
        Ok(())
    }

    fn read_count(&mut self) -> Result<u64, DeviceError> {
        let position = lock(&self.bus)?.position(self.id)?;
        // Pulse counter semantics: travel in either direction adds up
        self.count += wrapped_delta(self.last_position, position).unsigned_abs() as u64;
        self.last_position = position;
        Ok(self.count)
    }
}
