//! Movement commands submitted by players

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single actuator action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    None,
    Forward,
    Backward,
    Left,
    Right,
    Raise,
    Lower,
    /// Drop the claw; irreversible once started
    Down,
    Stop,
    /// Flipper swing forward
    Strike,
    /// Flipper swing back home
    CounterStrike,
}

impl Direction {
    /// Destructive actions clear everything queued before them
    pub fn is_destructive(self) -> bool {
        matches!(self, Direction::Down | Direction::Strike)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::None => "none",
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Raise => "raise",
            Direction::Lower => "lower",
            Direction::Down => "down",
            Direction::Stop => "stop",
            Direction::Strike => "strike",
            Direction::CounterStrike => "counter_strike",
        };
        f.write_str(name)
    }
}

/// A queued movement command. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub direction: Direction,
    pub duration: Duration,
    pub submitted_at: DateTime<Utc>,
    /// Queue identity of the owner (username or team)
    pub player: String,
    pub machine: String,
    /// Set by the command queue for atomic multi-step sequences
    pub group: Option<u64>,
}

impl Command {
    pub fn new(
        direction: Direction,
        duration: Duration,
        player: impl Into<String>,
        machine: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            duration,
            submitted_at: Utc::now(),
            player: player.into(),
            machine: machine.into(),
            group: None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.direction.is_destructive()
    }
}
