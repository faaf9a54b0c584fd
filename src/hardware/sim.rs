// Simulated wheels for running without hardware
//
// Each wheel accumulates encoder counts at `counts_per_second * |power| / 100`,
// integrated over wall-clock time whenever it is touched.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::drivetrain::{DeviceError, Encoder, Motor};

#[derive(Debug)]
struct WheelState {
    power: i32,
    travelled: f64,
    since_reset: f64,
    jammed: bool,
    updated_at: Instant,
}

/// One simulated wheel; hand out a motor and an encoder that share it
#[derive(Debug, Clone)]
pub struct SimWheel {
    state: Arc<Mutex<WheelState>>,
    counts_per_second: f64,
}

impl SimWheel {
    pub fn new(counts_per_second: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(WheelState {
                power: 0,
                travelled: 0.0,
                since_reset: 0.0,
                jammed: false,
                updated_at: Instant::now(),
            })),
            counts_per_second,
        }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor(self.clone())
    }

    pub fn encoder(&self) -> SimEncoder {
        SimEncoder(self.clone())
    }

    /// A jammed wheel draws power but does not turn
    pub fn set_jammed(&self, jammed: bool) {
        if let Ok(mut state) = self.advance() {
            state.jammed = jammed;
        }
    }

    /// Last commanded power
    pub fn power(&self) -> i32 {
        self.advance().map(|s| s.power).unwrap_or(0)
    }

    /// Total counts since the wheel was created
    pub fn travelled(&self) -> f64 {
        self.advance().map(|s| s.travelled).unwrap_or(0.0)
    }

    /// Integrate travel up to now and return the locked state
    fn advance(&self) -> Result<MutexGuard<'_, WheelState>, DeviceError> {
        let mut state = self.state.lock().map_err(|_| DeviceError::BusPoisoned)?;
        let now = Instant::now();
        let dt = now.duration_since(state.updated_at).as_secs_f64();
        if !state.jammed {
            let step = self.counts_per_second * (state.power.unsigned_abs() as f64 / 100.0) * dt;
            state.travelled += step;
            state.since_reset += step;
        }
        state.updated_at = now;
        Ok(state)
    }
}

pub struct SimMotor(SimWheel);

impl Motor for SimMotor {
    fn set_power(&mut self, percent: i32) -> Result<(), DeviceError> {
        self.0.advance()?.power = percent.clamp(-100, 100);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.0.advance()?.power = 0;
        Ok(())
    }
}

pub struct SimEncoder(SimWheel);

impl Encoder for SimEncoder {
    fn reset_count(&mut self) -> Result<(), DeviceError> {
        self.0.advance()?.since_reset = 0.0;
        Ok(())
    }

    fn read_count(&mut self) -> Result<u64, DeviceError> {
        Ok(self.0.advance()?.since_reset.floor() as u64)
    }
}
