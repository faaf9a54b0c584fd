// Servo diagnostic: READ-ONLY check of the wheel servos and their encoder counts
//
// Nothing is written to the servos, the wheels stay unpowered.
// Turn each wheel by hand while the tool runs and watch the counts climb.
//
// Usage: cargo run --example servo_diagnostic -- [config.json]

use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use feh_drivetrain::config::{BackendConfig, DrivetrainConfig};
use feh_drivetrain::drivetrain::{EncoderPair, UnitConverter};
use feh_drivetrain::hardware::feetech::{FeetechBus, STEPS_PER_REVOLUTION};
use feh_drivetrain::hardware::servo::ServoEncoder;

const WATCH_SECS: u64 = 10;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DrivetrainConfig::load(path)?,
        None => DrivetrainConfig::default(),
    };
    let BackendConfig::Feetech { port, baudrate, .. } = &config.backend else {
        println!("Configuration selects the simulated backend, nothing to diagnose.");
        return Ok(());
    };

    println!("Serial port: {} @ {} baud", port, baudrate);
    let bus = Arc::new(Mutex::new(FeetechBus::open(port, *baudrate)?));

    println!("Step 1: Pinging wheel servos...");
    let wheels = [
        ("Right", config.right_encoder_id),
        ("Left", config.left_encoder_id),
    ];
    for (name, id) in wheels {
        let mut bus = bus.lock().map_err(|_| "bus lock poisoned")?;
        match bus.ping(id) {
            Ok(true) => {
                let model = bus.model_number(id)?;
                let position = bus.position(id)?;
                let degrees = position as f32 * 360.0 / STEPS_PER_REVOLUTION as f32;
                println!(
                    "  ✓ {} (ID {}): model {}, position {} ({:.1}°)",
                    name, id, model, position, degrees
                );
            }
            Ok(false) => {
                println!("  ✗ {} (ID {}) NOT responding - check power, wiring and ids", name, id);
                return Ok(());
            }
            Err(e) => {
                println!("  ✗ {} (ID {}) error: {}", name, id, e);
                return Ok(());
            }
        }
    }
    println!();

    println!("Step 2: Turn the wheels by hand for {}s...", WATCH_SECS);
    let mut encoders = EncoderPair::new(
        ServoEncoder::connect(bus.clone(), config.right_encoder_id, "right encoder")?,
        ServoEncoder::connect(bus, config.left_encoder_id, "left encoder")?,
    );
    encoders.reset()?;

    let units = UnitConverter::new(
        config.counts_per_rotation,
        config.wheel_radius_in,
        config.turn_base_distance_in,
    );
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(WATCH_SECS) {
        let (right, left) = encoders.counts()?;
        let average = (right + left) as f64 / 2.0;
        println!(
            "  right={:6} left={:6} avg={:8.1} (~{:.2} in)",
            right,
            left,
            average,
            average / units.counts_per_inch()
        );
        sleep(Duration::from_millis(250));
    }

    println!();
    println!("If counts rose on both wheels, set counts_per_rotation = {} in the", STEPS_PER_REVOLUTION);
    println!("configuration and try: cargo run -- drive 6 --percent 25");
    Ok(())
}

