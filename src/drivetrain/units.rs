// Encoder count math for the drivetrain
// Converts inches of wheel travel and degrees of in-place rotation into encoder pulse targets.

use std::f64::consts::PI;

/// Converts physical distances and angles into encoder pulse counts.
///
/// `counts_per_inch` is fixed when the converter is built; there are no setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    counts_per_inch: f64,
    turn_base_distance_in: f64,
}

impl UnitConverter {
    /// Build from wheel geometry
    ///
    /// # Arguments
    /// * `counts_per_rotation` - Encoder pulses per full wheel revolution
    /// * `wheel_radius_in` - Wheel radius in inches
    /// * `turn_base_distance_in` - Arc length each wheel travels for a 90° in-place turn
    pub fn new(counts_per_rotation: u32, wheel_radius_in: f64, turn_base_distance_in: f64) -> Self {
        let counts_per_inch = counts_per_rotation as f64 / (2.0 * PI * wheel_radius_in);
        Self::from_counts_per_inch(counts_per_inch, turn_base_distance_in)
    }

    /// Build from an already calibrated counts-per-inch value
    pub fn from_counts_per_inch(counts_per_inch: f64, turn_base_distance_in: f64) -> Self {
        Self {
            counts_per_inch,
            turn_base_distance_in,
        }
    }

    pub fn counts_per_inch(&self) -> f64 {
        self.counts_per_inch
    }

    pub fn turn_base_distance_in(&self) -> f64 {
        self.turn_base_distance_in
    }

    /// Pulse target for a straight drive. Rounds up so the robot never stops short.
    pub fn distance_to_counts(&self, inches: f64) -> i64 {
        (inches * self.counts_per_inch).ceil() as i64
    }

    /// Pulse target for an in-place turn, scaled linearly from the 90° calibration.
    pub fn turn_distance_to_counts(&self, angle_deg: f64) -> i64 {
        (self.turn_base_distance_in * self.counts_per_inch * (angle_deg / 90.0)).ceil() as i64
    }
}
