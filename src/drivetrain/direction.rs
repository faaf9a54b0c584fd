use serde::{Deserialize, Serialize};

/// Turn direction, used as a sign on commanded power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Counter-clockwise
    Left,
    /// Clockwise
    Right,
}

impl Direction {
    pub fn to_sign(self) -> i32 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
        }
    }
}
