// Drive a 12in square on simulated wheels, no hardware or zenoh needed
//
// Usage: RUST_LOG=debug cargo run --example sim_square

use feh_drivetrain::config::{BackendConfig, DrivetrainConfig};
use feh_drivetrain::drivetrain::Direction;
use feh_drivetrain::hardware;
use tracing::info;

const SIDE_INCHES: f64 = 12.0;
const POWER: i32 = 40;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = DrivetrainConfig {
        backend: BackendConfig::sim(),
        poll_interval_us: 500,
        ..Default::default()
    };
    let (right, left) = hardware::sim_wheels(2000.0);
    let mut drivetrain = hardware::build_sim(&config, &right, &left)?;

    for side in 1..=4 {
        let drive = drivetrain.drive_forward(SIDE_INCHES, POWER)?;
        let turn = drivetrain.turn(90.0, Direction::Right, POWER)?;
        info!(
            "Side {}: {} counts in {} ms, corner {} counts in {} ms",
            side, drive.target_counts, drive.elapsed_ms, turn.target_counts, turn.elapsed_ms
        );
    }

    info!(
        "Wheel travel: right {:.0} counts, left {:.0} counts",
        right.travelled(),
        left.travelled()
    );
    Ok(())
}
