// Right/left wheel encoder pair

use super::error::DeviceError;

/// Incremental pulse counter on a wheel
pub trait Encoder {
    fn reset_count(&mut self) -> Result<(), DeviceError>;

    /// Pulses since the last reset, never decreasing between resets
    fn read_count(&mut self) -> Result<u64, DeviceError>;
}

impl<T: Encoder + ?Sized> Encoder for Box<T> {
    fn reset_count(&mut self) -> Result<(), DeviceError> {
        (**self).reset_count()
    }

    fn read_count(&mut self) -> Result<u64, DeviceError> {
        (**self).read_count()
    }
}

/// Owns both wheel encoders
pub struct EncoderPair<E> {
    right: E,
    left: E,
}

impl<E: Encoder> EncoderPair<E> {
    pub fn new(right: E, left: E) -> Self {
        Self { right, left }
    }

    pub fn reset(&mut self) -> Result<(), DeviceError> {
        self.right.reset_count()?;
        self.left.reset_count()
    }

    /// Raw counts as (right, left)
    pub fn counts(&mut self) -> Result<(u64, u64), DeviceError> {
        Ok((self.right.read_count()?, self.left.read_count()?))
    }

    /// Mean travel of both wheels. A lagging wheel delays the stop, a slipping one advances it.
    pub fn average_progress(&mut self) -> Result<f64, DeviceError> {
        let (right, left) = self.counts()?;
        Ok((right + left) as f64 / 2.0)
    }
}
