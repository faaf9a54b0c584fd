// Drive-and-wait motion primitives
//
// Every primitive resets the encoders, applies constant power, blocks until the
// averaged encoder count reaches the target, then stops both motors. Stop is
// always the last motor action, whether the motion completed, stalled, was
// aborted or hit a device error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::direction::Direction;
use super::encoders::{Encoder, EncoderPair};
use super::error::DrivetrainError;
use super::motors::{check_percent, Motor, MotorPair};
use super::units::UnitConverter;
use crate::config::DrivetrainConfig;

/// Polling behaviour of the wait loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    /// Sleep between polls; zero spins
    pub poll_interval: Duration,
    /// Stop and report a stall after this long; `None` waits forever
    pub stall_timeout: Option<Duration>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            stall_timeout: Some(Duration::from_millis(crate::config::STALL_TIMEOUT_MS)),
        }
    }
}

/// Outcome of a completed motion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSummary {
    pub target_counts: i64,
    pub progress: f64,
    pub elapsed_ms: u64,
}

/// Cancels the in-flight motion from another thread
///
/// Each motion clears the flag as it starts, so only an abort raised while the
/// motion is running cancels it.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Two-wheel differential drivetrain with encoder feedback
pub struct Drivetrain<M, E> {
    motors: MotorPair<M>,
    encoders: EncoderPair<E>,
    units: UnitConverter,
    max_voltage: f64,
    settings: ControlSettings,
    abort: AbortHandle,
}

impl<M: Motor, E: Encoder> Drivetrain<M, E> {
    /// Take ownership of both motors and encoders, configured from `config`
    pub fn new(
        config: &DrivetrainConfig,
        right_motor: M,
        left_motor: M,
        right_encoder: E,
        left_encoder: E,
    ) -> Result<Self, DrivetrainError> {
        config.validate()?;

        let units = UnitConverter::new(
            config.counts_per_rotation,
            config.wheel_radius_in,
            config.turn_base_distance_in,
        );
        let motors = MotorPair::new(
            right_motor,
            left_motor,
            config.right_motor_inverted,
            config.left_motor_inverted,
        );
        let settings = ControlSettings {
            poll_interval: config.poll_interval(),
            stall_timeout: config.stall_timeout(),
        };

        info!(
            "Drivetrain ready: {:.2} counts/in, turn base {} in",
            units.counts_per_inch(),
            units.turn_base_distance_in()
        );

        Ok(Self::from_parts(
            motors,
            EncoderPair::new(right_encoder, left_encoder),
            units,
            config.max_voltage,
            settings,
        ))
    }

    /// Assemble from already built parts
    pub fn from_parts(
        motors: MotorPair<M>,
        encoders: EncoderPair<E>,
        units: UnitConverter,
        max_voltage: f64,
        settings: ControlSettings,
    ) -> Self {
        Self {
            motors,
            encoders,
            units,
            max_voltage,
            settings,
            abort: AbortHandle::default(),
        }
    }

    /// Drive straight for `inches` at `percent` power (negative drives backward)
    pub fn drive_forward(&mut self, inches: f64, percent: i32) -> Result<MotionSummary, DrivetrainError> {
        check_percent(percent)?;
        let target = self.units.distance_to_counts(inches);
        info!("Drive forward {} in at {}% ({} counts)", inches, percent, target);
        self.drive_and_wait(target, percent, percent)
    }

    /// Rotate in place by `angle_deg` toward `direction`
    pub fn turn(
        &mut self,
        angle_deg: f64,
        direction: Direction,
        percent: i32,
    ) -> Result<MotionSummary, DrivetrainError> {
        check_percent(percent)?;
        let target = self.units.turn_distance_to_counts(angle_deg);
        info!(
            "Turn {:?} {}° at {}% ({} counts)",
            direction, angle_deg, percent, target
        );

        // Right wheel backward, left forward spins the chassis clockwise
        let sign = direction.to_sign();
        self.drive_and_wait(target, -sign * percent, sign * percent)
    }

    /// Face a heading relative to the current forward axis, then drive `inches` along it
    ///
    /// Positive angles are clockwise (right). The heading is normalised into
    /// (-180, 180] so the robot always takes the shorter rotation.
    pub fn drive_in_direction(
        &mut self,
        inches: f64,
        angle_deg: f64,
        percent: i32,
    ) -> Result<MotionSummary, DrivetrainError> {
        check_percent(percent)?;
        let heading = normalize_heading(angle_deg);
        info!("Drive {} in along heading {}°", inches, heading);

        let mut total = MotionSummary {
            target_counts: 0,
            progress: 0.0,
            elapsed_ms: 0,
        };

        if heading != 0.0 {
            let direction = if heading > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            };
            let turned = self.turn(heading.abs(), direction, percent)?;
            total.target_counts += turned.target_counts;
            total.progress += turned.progress;
            total.elapsed_ms += turned.elapsed_ms;
        }

        let driven = self.drive_forward(inches, percent)?;
        total.target_counts += driven.target_counts;
        total.progress += driven.progress;
        total.elapsed_ms += driven.elapsed_ms;
        Ok(total)
    }

    /// Command both motors with raw percentages
    pub fn set_motor_percent(&mut self, right: i32, left: i32) -> Result<(), DrivetrainError> {
        self.motors.set_percent(right, left)
    }

    pub fn stop(&mut self) -> Result<(), DrivetrainError> {
        Ok(self.motors.stop()?)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn units(&self) -> &UnitConverter {
        &self.units
    }

    pub fn max_voltage(&self) -> f64 {
        self.max_voltage
    }

    pub fn settings(&self) -> ControlSettings {
        self.settings
    }

    /// Reset, power the wheels (chassis frame), wait for the target, stop
    fn drive_and_wait(
        &mut self,
        target: i64,
        right: i32,
        left: i32,
    ) -> Result<MotionSummary, DrivetrainError> {
        // Only an abort raised during this motion cancels it
        self.abort.reset();
        let started = Instant::now();

        let waited = self.run_to_target(target, right, left, started);
        let stopped = self.motors.stop();

        let progress = waited?;
        stopped?;

        let elapsed = started.elapsed();
        debug!(
            "Reached {} of {} counts in {:?}",
            progress, target, elapsed
        );
        Ok(MotionSummary {
            target_counts: target,
            progress,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    fn run_to_target(
        &mut self,
        target: i64,
        right: i32,
        left: i32,
        started: Instant,
    ) -> Result<f64, DrivetrainError> {
        self.encoders.reset()?;

        let target_f = target as f64;
        if target <= 0 {
            debug!("Target {} already satisfied, not powering motors", target);
            return Ok(0.0);
        }

        self.motors.set_wheel_percent(right, left)?;

        loop {
            let progress = self.encoders.average_progress()?;
            if progress >= target_f {
                return Ok(progress);
            }

            if self.abort.is_aborted() {
                warn!("Motion aborted at {} of {} counts", progress, target);
                return Err(DrivetrainError::Aborted);
            }

            let elapsed = started.elapsed();
            if let Some(timeout) = self.settings.stall_timeout {
                if elapsed >= timeout {
                    let (r, l) = self.encoders.counts()?;
                    warn!(
                        "Stall: {} of {} counts after {:?} (right={}, left={})",
                        progress, target, elapsed, r, l
                    );
                    return Err(DrivetrainError::StallTimeout {
                        target,
                        progress,
                        elapsed,
                    });
                }
            }

            if self.settings.poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(self.settings.poll_interval);
            }
        }
    }
}

/// Wrap a heading into (-180, 180]
pub fn normalize_heading(angle_deg: f64) -> f64 {
    let wrapped = angle_deg.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivetrain::error::DeviceError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Power { right: i32, left: i32 },
        Stop,
        Reset,
        Read(u64, u64),
    }

    /// Shared log of every hardware interaction plus a fake wheel model
    #[derive(Default)]
    struct Bench {
        events: Vec<Event>,
        right_power: i32,
        left_power: i32,
        right_stopped: bool,
        left_stopped: bool,
        right_count: u64,
        left_count: u64,
        /// counts added per read while powered
        rate: u64,
        /// left wheel jammed
        left_jammed: bool,
        right_jammed: bool,
        fail_reads_after: Option<usize>,
        reads: usize,
        /// encoder counts when power was first applied
        counts_at_power: Option<(u64, u64)>,
    }

    type Shared = Arc<Mutex<Bench>>;

    struct FakeMotor {
        right: bool,
        bench: Shared,
    }

    impl Motor for FakeMotor {
        fn set_power(&mut self, percent: i32) -> Result<(), DeviceError> {
            let mut b = self.bench.lock().unwrap();
            if self.right {
                b.right_power = percent;
                b.right_stopped = false;
            } else {
                b.left_power = percent;
                b.left_stopped = false;
                let (right, left) = (b.right_power, b.left_power);
                b.events.push(Event::Power { right, left });
                if b.counts_at_power.is_none() {
                    b.counts_at_power = Some((b.right_count, b.left_count));
                }
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), DeviceError> {
            let mut b = self.bench.lock().unwrap();
            if self.right {
                b.right_power = 0;
                b.right_stopped = true;
            } else {
                b.left_power = 0;
                b.left_stopped = true;
                b.events.push(Event::Stop);
            }
            Ok(())
        }
    }

    struct FakeEncoder {
        right: bool,
        bench: Shared,
    }

    impl Encoder for FakeEncoder {
        fn reset_count(&mut self) -> Result<(), DeviceError> {
            let mut b = self.bench.lock().unwrap();
            if self.right {
                b.right_count = 0;
            } else {
                b.left_count = 0;
                b.events.push(Event::Reset);
            }
            Ok(())
        }

        fn read_count(&mut self) -> Result<u64, DeviceError> {
            let mut b = self.bench.lock().unwrap();
            b.reads += 1;
            if let Some(limit) = b.fail_reads_after {
                if b.reads > limit {
                    return Err(DeviceError::Unavailable {
                        name: "encoder".into(),
                    });
                }
            }
            let rate = b.rate;
            if self.right {
                if b.right_power != 0 && !b.right_jammed {
                    b.right_count += rate;
                }
                Ok(b.right_count)
            } else {
                if b.left_power != 0 && !b.left_jammed {
                    b.left_count += rate;
                }
                let (r, l) = (b.right_count, b.left_count);
                b.events.push(Event::Read(r, l));
                Ok(l)
            }
        }
    }

    fn drivetrain(rate: u64, settings: ControlSettings) -> (Drivetrain<FakeMotor, FakeEncoder>, Shared) {
        let bench = Arc::new(Mutex::new(Bench {
            rate,
            ..Default::default()
        }));
        let motors = MotorPair::new(
            FakeMotor { right: true, bench: bench.clone() },
            FakeMotor { right: false, bench: bench.clone() },
            true,
            false,
        );
        let encoders = EncoderPair::new(
            FakeEncoder { right: true, bench: bench.clone() },
            FakeEncoder { right: false, bench: bench.clone() },
        );
        let units = UnitConverter::from_counts_per_inch(40.5, 6.0);
        (
            Drivetrain::from_parts(motors, encoders, units, 9.0, settings),
            bench,
        )
    }

    fn fast() -> ControlSettings {
        ControlSettings {
            poll_interval: Duration::ZERO,
            stall_timeout: Some(Duration::from_secs(5)),
        }
    }

    fn powers(events: &[Event]) -> Vec<(i32, i32)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Power { right, left } => Some((*right, *left)),
                _ => None,
            })
            .collect()
    }

    fn assert_stop_is_last_motor_action(events: &[Event]) {
        let last_motor = events
            .iter()
            .rev()
            .find(|e| matches!(e, Event::Power { .. } | Event::Stop));
        assert_eq!(last_motor, Some(&Event::Stop));
        assert_eq!(events.iter().filter(|e| **e == Event::Stop).count(), 1);
    }

    fn assert_reset_before_power(events: &[Event]) {
        let reset = events.iter().position(|e| *e == Event::Reset).unwrap();
        assert_eq!(events.iter().filter(|e| **e == Event::Reset).count(), 1);
        if let Some(power) = events.iter().position(|e| matches!(e, Event::Power { .. })) {
            assert!(reset < power, "encoders must be reset before power");
        }
    }

    #[test]
    fn test_drive_forward_six_inches() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.drive_forward(6.0, 25).unwrap();

        assert_eq!(summary.target_counts, 243);
        assert!(summary.progress >= 243.0);

        let b = bench.lock().unwrap();
        assert_eq!(powers(&b.events), vec![(-25, 25)]);
        assert_reset_before_power(&b.events);
        assert_stop_is_last_motor_action(&b.events);
        assert!(b.right_stopped && b.left_stopped);

        // Every progress read before the stop was below target, except the last
        let reads: Vec<f64> = b
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Read(r, l) => Some((*r + *l) as f64 / 2.0),
                _ => None,
            })
            .collect();
        let (last, earlier) = reads.split_last().unwrap();
        assert!(*last >= 243.0);
        assert!(earlier.iter().all(|p| *p < 243.0));
        // 10 counts per read -> 25 polls to cross 243
        assert_eq!(reads.len(), 25);
    }

    #[test]
    fn test_turn_right_ninety() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.turn(90.0, Direction::Right, 25).unwrap();

        assert_eq!(summary.target_counts, 243);
        let b = bench.lock().unwrap();
        assert_eq!(powers(&b.events), vec![(25, 25)]);
        assert_stop_is_last_motor_action(&b.events);
    }

    #[test]
    fn test_turn_left_forty_five() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.turn(45.0, Direction::Left, 25).unwrap();

        assert_eq!(summary.target_counts, 122);
        assert!(summary.progress >= 122.0);
        let b = bench.lock().unwrap();
        assert_eq!(powers(&b.events), vec![(-25, -25)]);
        assert_reset_before_power(&b.events);
        assert_stop_is_last_motor_action(&b.events);
    }

    #[test]
    fn test_zero_distance_returns_immediately() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.drive_forward(0.0, 25).unwrap();

        assert_eq!(summary.target_counts, 0);
        assert_eq!(summary.progress, 0.0);
        let b = bench.lock().unwrap();
        // Reset and stop only: power never applied
        assert_eq!(b.events, vec![Event::Reset, Event::Stop]);
    }

    #[test]
    fn test_negative_angle_is_already_satisfied() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.turn(-30.0, Direction::Right, 25).unwrap();
        assert!(summary.target_counts < 0);
        assert!(powers(&bench.lock().unwrap().events).is_empty());
    }

    #[test]
    fn test_counts_are_zero_right_after_reset() {
        let (mut dt, bench) = drivetrain(10, fast());
        {
            let mut b = bench.lock().unwrap();
            b.right_count = 500;
            b.left_count = 480;
        }
        dt.drive_forward(1.0, 50).unwrap();

        let b = bench.lock().unwrap();
        assert_eq!(b.counts_at_power, Some((0, 0)));
        assert_reset_before_power(&b.events);
    }

    #[test]
    fn test_invalid_percent_touches_nothing() {
        let (mut dt, bench) = drivetrain(10, fast());
        assert!(matches!(
            dt.drive_forward(6.0, 120),
            Err(DrivetrainError::InvalidPercent(120))
        ));
        assert!(matches!(
            dt.turn(90.0, Direction::Left, -101),
            Err(DrivetrainError::InvalidPercent(_))
        ));
        assert!(bench.lock().unwrap().events.is_empty());
    }

    #[test]
    fn test_extreme_percent_is_rejected_not_overflowed() {
        let (mut dt, bench) = drivetrain(10, fast());
        assert!(matches!(
            dt.turn(90.0, Direction::Right, i32::MIN),
            Err(DrivetrainError::InvalidPercent(i32::MIN))
        ));
        assert!(matches!(
            dt.turn(90.0, Direction::Left, i32::MAX),
            Err(DrivetrainError::InvalidPercent(i32::MAX))
        ));
        assert!(matches!(
            dt.drive_in_direction(6.0, 45.0, i32::MIN),
            Err(DrivetrainError::InvalidPercent(i32::MIN))
        ));
        assert!(bench.lock().unwrap().events.is_empty());
    }

    #[test]
    fn test_invalid_percent_reports_callers_value() {
        let (mut dt, _bench) = drivetrain(10, fast());
        // A right turn drives the right wheel backward, but the error names what was asked for
        assert!(matches!(
            dt.turn(90.0, Direction::Right, 120),
            Err(DrivetrainError::InvalidPercent(120))
        ));
        assert!(matches!(
            dt.turn(90.0, Direction::Left, -130),
            Err(DrivetrainError::InvalidPercent(-130))
        ));
    }

    #[test]
    fn test_stalled_wheels_time_out_and_stop() {
        let settings = ControlSettings {
            poll_interval: Duration::from_micros(200),
            stall_timeout: Some(Duration::from_millis(30)),
        };
        let (mut dt, bench) = drivetrain(10, settings);
        {
            let mut b = bench.lock().unwrap();
            b.right_jammed = true;
            b.left_jammed = true;
        }

        let result = dt.drive_forward(6.0, 25);
        match result {
            Err(DrivetrainError::StallTimeout { target, progress, elapsed }) => {
                assert_eq!(target, 243);
                assert_eq!(progress, 0.0);
                assert!(elapsed >= Duration::from_millis(30));
            }
            other => panic!("expected stall, got {:?}", other),
        }

        let b = bench.lock().unwrap();
        assert_stop_is_last_motor_action(&b.events);
        assert!(b.right_stopped && b.left_stopped);
    }

    #[test]
    fn test_one_jammed_wheel_doubles_the_other() {
        let (mut dt, bench) = drivetrain(10, fast());
        bench.lock().unwrap().left_jammed = true;

        let summary = dt.drive_forward(6.0, 25).unwrap();
        let b = bench.lock().unwrap();
        // Average crosses 243 only once the free wheel reaches 486
        assert!(b.right_count >= 486);
        assert_eq!(b.left_count, 0);
        assert!(summary.progress >= 243.0);
    }

    #[test]
    fn test_encoder_failure_still_stops() {
        let (mut dt, bench) = drivetrain(10, fast());
        bench.lock().unwrap().fail_reads_after = Some(6);

        let result = dt.drive_forward(6.0, 25);
        assert!(matches!(result, Err(DrivetrainError::Device(_))));
        let b = bench.lock().unwrap();
        assert_stop_is_last_motor_action(&b.events);
    }

    #[test]
    fn test_abort_from_another_thread() {
        let settings = ControlSettings {
            poll_interval: Duration::from_millis(1),
            stall_timeout: None,
        };
        let (mut dt, bench) = drivetrain(10, settings);
        {
            let mut b = bench.lock().unwrap();
            b.right_jammed = true;
            b.left_jammed = true;
        }

        let abort = dt.abort_handle();
        let aborter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            abort.abort();
        });

        let result = dt.drive_forward(6.0, 25);
        aborter.join().unwrap();

        assert!(matches!(result, Err(DrivetrainError::Aborted)));
        assert_stop_is_last_motor_action(&bench.lock().unwrap().events);

        // Abort flag does not leak into the next command
        {
            let mut b = bench.lock().unwrap();
            b.right_jammed = false;
            b.left_jammed = false;
            b.events.clear();
        }
        assert!(dt.drive_forward(1.0, 25).is_ok());
    }

    #[test]
    fn test_abort_while_idle_does_not_cancel_next_motion() {
        let (mut dt, bench) = drivetrain(10, fast());
        dt.abort_handle().abort();

        let summary = dt.drive_forward(6.0, 50).unwrap();
        assert!(summary.progress >= 243.0);
        assert_stop_is_last_motor_action(&bench.lock().unwrap().events);
    }

    #[test]
    fn test_drive_in_direction_turns_then_drives() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.drive_in_direction(6.0, -45.0, 30).unwrap();

        // 122 for the turn, 243 for the drive
        assert_eq!(summary.target_counts, 365);
        let b = bench.lock().unwrap();
        assert_eq!(powers(&b.events), vec![(-30, -30), (-30, 30)]);
        assert_eq!(b.events.iter().filter(|e| **e == Event::Reset).count(), 2);
        assert_eq!(b.events.iter().filter(|e| **e == Event::Stop).count(), 2);
        assert_eq!(b.events.last(), Some(&Event::Stop));
    }

    #[test]
    fn test_drive_in_direction_straight_ahead_skips_turn() {
        let (mut dt, bench) = drivetrain(10, fast());
        let summary = dt.drive_in_direction(6.0, 360.0, 25).unwrap();
        assert_eq!(summary.target_counts, 243);
        assert_eq!(powers(&bench.lock().unwrap().events), vec![(-25, 25)]);
    }

    #[test]
    fn test_drive_in_direction_takes_short_way_round() {
        let (mut dt, bench) = drivetrain(10, fast());
        // 270° clockwise is 90° counter-clockwise
        dt.drive_in_direction(0.0, 270.0, 25).unwrap();
        assert_eq!(powers(&bench.lock().unwrap().events), vec![(-25, -25)]);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(0.0), 0.0);
        assert_eq!(normalize_heading(90.0), 90.0);
        assert_eq!(normalize_heading(180.0), 180.0);
        assert_eq!(normalize_heading(-180.0), 180.0);
        assert_eq!(normalize_heading(190.0), -170.0);
        assert_eq!(normalize_heading(-90.0), -90.0);
        assert_eq!(normalize_heading(720.0), 0.0);
    }

    #[test]
    fn test_new_from_config() {
        let bench: Shared = Arc::new(Mutex::new(Bench::default()));
        let config = DrivetrainConfig::default();
        let dt = Drivetrain::new(
            &config,
            FakeMotor { right: true, bench: bench.clone() },
            FakeMotor { right: false, bench: bench.clone() },
            FakeEncoder { right: true, bench: bench.clone() },
            FakeEncoder { right: false, bench },
        )
        .unwrap();
        assert!((dt.units().counts_per_inch() - 318.0 / (3.0 * std::f64::consts::PI)).abs() < 1e-9);
        assert_eq!(dt.max_voltage(), 9.0);
        assert_eq!(dt.settings().stall_timeout, Some(Duration::from_secs(10)));
    }
}
