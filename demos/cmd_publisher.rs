// Keyboard commander: W/S drive 6in, A/D turn 90°, Q/E turn 45°, SPACE stop, R/F power, ESC quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::{info, warn};

use feh_drivetrain::config::{TOPIC_CMD_DRIVE, TOPIC_MOTION};
use feh_drivetrain::drivetrain::Direction;
use feh_drivetrain::messages::{MotionCommand, MotionReport};

const POWERS: [i32; 3] = [25, 40, 60]; // percent
const STEP_INCHES: f64 = 6.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Controls: W/S=drive, A/D=turn 90, Q/E=turn 45, SPACE=stop, R/F=power, ESC=quit");
    info!("Power: {}%", POWERS[0]);

    enable_raw_mode()?;
    let result = run_commander(&session).await;
    disable_raw_mode()?;

    result
}

fn key_to_command(code: KeyCode, percent: i32) -> Option<MotionCommand> {
    let turn = |angle_deg, direction| MotionCommand::Turn {
        angle_deg,
        direction,
        percent,
    };
    match code {
        KeyCode::Char('w') => Some(MotionCommand::DriveForward {
            inches: STEP_INCHES,
            percent,
        }),
        KeyCode::Char('s') => Some(MotionCommand::DriveForward {
            inches: STEP_INCHES,
            percent: -percent,
        }),
        KeyCode::Char('a') => Some(turn(90.0, Direction::Left)),
        KeyCode::Char('d') => Some(turn(90.0, Direction::Right)),
        KeyCode::Char('q') => Some(turn(45.0, Direction::Left)),
        KeyCode::Char('e') => Some(turn(45.0, Direction::Right)),
        KeyCode::Char(' ') => Some(MotionCommand::Stop),
        _ => None,
    }
}

async fn run_commander(
    session: &zenoh::Session,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let reports = session.declare_subscriber(TOPIC_MOTION).await?;
    let mut power_idx: usize = 0;

    loop {
        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }

                match code {
                    KeyCode::Esc => break,
                    KeyCode::Char('r') => {
                        power_idx = (power_idx + 1).min(POWERS.len() - 1);
                        info!("Power: {}%", POWERS[power_idx]);
                    }
                    KeyCode::Char('f') => {
                        power_idx = power_idx.saturating_sub(1);
                        info!("Power: {}%", POWERS[power_idx]);
                    }
                    other => {
                        if let Some(command) = key_to_command(other, POWERS[power_idx]) {
                            info!("Sending {:?}", command);
                            publisher.put(serde_json::to_string(&command)?).await?;
                        }
                    }
                }
            }
        }

        // Print whatever the runtime reported back
        while let Ok(Some(sample)) = reports.try_recv() {
            match serde_json::from_slice::<MotionReport>(&sample.payload().to_bytes()) {
                Ok(report) => info!("{:?} -> {:?}", report.command, report.outcome),
                Err(e) => warn!("Unreadable report: {}", e),
            }
        }
    }

    Ok(())
}
