use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use feh_drivetrain::config::{BackendConfig, DrivetrainConfig};
use feh_drivetrain::drivetrain::{Direction, DrivetrainError, MotionSummary};
use feh_drivetrain::messages::MotionCommand;
use feh_drivetrain::{hardware, runtime};

#[derive(Parser)]
#[command(version, about = "Two-wheel drivetrain runtime")]
struct Cli {
    /// JSON drivetrain configuration (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use simulated wheels instead of the servo bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the servo bus (overrides the configuration)
    #[arg(long, conflicts_with = "sim")]
    port: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve motion commands over zenoh (default)
    Run,
    /// Drive straight
    Drive {
        #[arg(allow_negative_numbers = true)]
        inches: f64,
        #[arg(long, default_value_t = 25, allow_negative_numbers = true)]
        percent: i32,
    },
    /// Turn in place
    Turn {
        angle: f64,
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long, default_value_t = 25)]
        percent: i32,
    },
    /// Turn to a heading (positive = clockwise), then drive along it
    Heading {
        inches: f64,
        #[arg(allow_negative_numbers = true)]
        angle: f64,
        #[arg(long, default_value_t = 25)]
        percent: i32,
    },
}

fn load_config(cli: &Cli) -> Result<DrivetrainConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &cli.config {
        Some(path) => DrivetrainConfig::load(path)?,
        None => DrivetrainConfig::default(),
    };

    if cli.sim {
        config.backend = BackendConfig::sim();
    } else if let Some(port) = &cli.port {
        if let BackendConfig::Feetech { port: configured, .. } = &mut config.backend {
            *configured = port.clone();
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Drivetrain error: {}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config(&cli)?;

    let command = match cli.command.unwrap_or(Command::Run) {
        Command::Run => return runtime::run(&config).await,
        Command::Drive { inches, percent } => MotionCommand::DriveForward { inches, percent },
        Command::Turn {
            angle,
            direction,
            percent,
        } => MotionCommand::Turn {
            angle_deg: angle,
            direction,
            percent,
        },
        Command::Heading {
            inches,
            angle,
            percent,
        } => MotionCommand::DriveInDirection {
            inches,
            angle_deg: angle,
            percent,
        },
    };

    // One-shot motion: blocks until the wheels stop
    let summary = tokio::task::spawn_blocking(move || -> Result<MotionSummary, DrivetrainError> {
        let mut drivetrain = hardware::build(&config)?;
        runtime::execute(&mut drivetrain, &command)
    })
    .await??;

    info!(
        "Done: {} of {} counts in {} ms",
        summary.progress, summary.target_counts, summary.elapsed_ms
    );
    Ok(())
}
