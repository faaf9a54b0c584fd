// Command bus runtime: one motion at a time
// Motion commands arrive over zenoh, run to completion on a blocking thread, and
// are answered with a report. The drivetrain is lent to the running motion, so a
// second motion command cannot start until the first hands it back.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

// local imports
use crate::config::{DrivetrainConfig, LOOP_HZ, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_MOTION};
use crate::drivetrain::{AbortHandle, DrivetrainError, MotionSummary};
use crate::hardware::{self, DynDrivetrain};
use crate::messages::{MotionCommand, MotionOutcome, MotionReport, RuntimeHealth};

type MotionResult = Result<MotionSummary, DrivetrainError>;

struct InFlight {
    command: MotionCommand,
    task: JoinHandle<(DynDrivetrain, MotionResult)>,
}

pub struct Runtime {
    drivetrain: Option<DynDrivetrain>,
    abort: AbortHandle,
    in_flight: Option<InFlight>,
    /// Stop received for the motion in flight
    stop_requested: bool,
    health: RuntimeHealth,
}

/// Run one command on the calling thread
pub fn execute(drivetrain: &mut DynDrivetrain, command: &MotionCommand) -> MotionResult {
    match *command {
        MotionCommand::DriveForward { inches, percent } => drivetrain.drive_forward(inches, percent),
        MotionCommand::Turn {
            angle_deg,
            direction,
            percent,
        } => drivetrain.turn(angle_deg, direction, percent),
        MotionCommand::DriveInDirection {
            inches,
            angle_deg,
            percent,
        } => drivetrain.drive_in_direction(inches, angle_deg, percent),
        MotionCommand::Stop => {
            drivetrain.stop()?;
            Ok(MotionSummary {
                target_counts: 0,
                progress: 0.0,
                elapsed_ms: 0,
            })
        }
    }
}

impl Runtime {
    pub fn new(drivetrain: DynDrivetrain) -> Self {
        Self {
            abort: drivetrain.abort_handle(),
            drivetrain: Some(drivetrain),
            in_flight: None,
            stop_requested: false,
            health: RuntimeHealth::Idle,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Handle an incoming command. Returns a report only when the command is answered right away.
    pub fn on_command(&mut self, command: MotionCommand) -> Option<MotionReport> {
        info!("Received command: {:?}", &command);

        if command == MotionCommand::Stop {
            if self.in_flight.is_some() {
                warn!("Stop requested, aborting motion in flight");
                self.stop_requested = true;
                self.abort.abort();
                return None;
            }
            let outcome = match self.drivetrain.as_mut() {
                Some(drivetrain) => outcome_of(&execute(drivetrain, &command)),
                None => MotionOutcome::Failed {
                    error: "Drivetrain unavailable".into(),
                },
            };
            return Some(MotionReport { command, outcome });
        }

        let Some(mut drivetrain) = self.drivetrain.take() else {
            warn!("Rejecting {:?}: motion already in flight", command);
            return Some(MotionReport {
                command,
                outcome: MotionOutcome::Rejected {
                    reason: "Motion already in flight".into(),
                },
            });
        };

        self.stop_requested = false;
        let task_command = command.clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = execute(&mut drivetrain, &task_command);
            (drivetrain, result)
        });

        self.in_flight = Some(InFlight { command, task });
        self.health = RuntimeHealth::Moving;
        None
    }

    /// Collect the in-flight motion if it has finished
    ///
    /// A motion clears the abort flag when it starts, so a stop that arrived
    /// before the blocking task got going is raised again until it lands.
    pub async fn poll_finished(&mut self) -> Result<Option<MotionReport>, tokio::task::JoinError> {
        match &self.in_flight {
            Some(in_flight) if in_flight.task.is_finished() => {}
            Some(_) => {
                if self.stop_requested {
                    self.abort.abort();
                }
                return Ok(None);
            }
            None => return Ok(None),
        }
        self.stop_requested = false;
        let Some(InFlight { command, task }) = self.in_flight.take() else {
            return Ok(None);
        };

        let (drivetrain, result) = task.await?;
        self.drivetrain = Some(drivetrain);

        self.health = match &result {
            Ok(_) | Err(DrivetrainError::Aborted) => RuntimeHealth::Idle,
            Err(DrivetrainError::StallTimeout { .. }) => RuntimeHealth::Stalled,
            Err(_) => RuntimeHealth::Fault,
        };
        match &result {
            Ok(summary) => info!("{:?} done: {:?}", command, summary),
            Err(e) => warn!("{:?} failed: {}", command, e),
        }

        Ok(Some(MotionReport {
            outcome: outcome_of(&result),
            command,
        }))
    }
}

fn outcome_of(result: &MotionResult) -> MotionOutcome {
    match result {
        Ok(summary) => MotionOutcome::Completed(*summary),
        Err(e) => MotionOutcome::Failed {
            error: e.to_string(),
        },
    }
}

pub async fn run(config: &DrivetrainConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let drivetrain = hardware::build(config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_motion = session.declare_publisher(TOPIC_MOTION).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(drivetrain);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_MOTION, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain pending commands; motions arriving while busy are rejected
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionCommand>(&payload) {
                Ok(command) => {
                    if let Some(report) = runtime.on_command(command) {
                        pub_motion.put(serde_json::to_string(&report)?).await?;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Report a finished motion
        match runtime.poll_finished().await {
            Ok(Some(report)) => pub_motion.put(serde_json::to_string(&report)?).await?,
            Ok(None) => {}
            Err(e) => {
                // The drivetrain went down with the motion thread
                error!("Motion thread failed: {}", e);
                pub_health.put(serde_json::to_string(&RuntimeHealth::Fault)?).await?;
                return Err(e.into());
            }
        }

        // 3. Publish health
        pub_health.put(serde_json::to_string(&runtime.health())?).await?;
    }
}
