// Message types on the command bus

use serde::{Deserialize, Serialize};

use crate::drivetrain::{Direction, MotionSummary};

// Command from scripts/teleop -> runtime
// Tagged by "type", e.g. {"type":"turn","angle_deg":90,"direction":"right","percent":25}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionCommand {
    DriveForward {
        inches: f64,
        percent: i32,
    },
    Turn {
        angle_deg: f64,
        direction: Direction,
        percent: i32,
    },
    DriveInDirection {
        inches: f64,
        angle_deg: f64,
        percent: i32,
    },
    /// Abort whatever motion is in flight
    Stop,
}

/// What became of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MotionOutcome {
    Completed(MotionSummary),
    Failed { error: String },
    /// Not started because another motion was in flight
    Rejected { reason: String },
}

// Report from runtime -> observers, one per command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReport {
    pub command: MotionCommand,
    pub outcome: MotionOutcome,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Idle,
    Moving,
    Stalled,
    Fault,
}
