//! Turn scheduling for claw machines

pub mod command;
pub mod recovery;
pub mod registry;
pub mod round;
pub mod scheduler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use command::{Command, Direction};
pub use recovery::{RecoveryDecision, RecoveryPolicy};
pub use registry::{MachineRegistry, RegistryError};
pub use round::{Round, RoundPhase, RoundToken};
pub use scheduler::{JoinOutcome, MachineStatus, Submitted, TurnScheduler};

/// Game modes a machine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Single,
    Quick,
    TeamChaos,
    TicTacToe,
    Trivia,
    Plinko,
    Golf,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Single => "single",
            GameMode::Quick => "quick",
            GameMode::TeamChaos => "team_chaos",
            GameMode::TicTacToe => "tic_tac_toe",
            GameMode::Trivia => "trivia",
            GameMode::Plinko => "plinko",
            GameMode::Golf => "golf",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single" | "queue" => GameMode::Single,
            "quick" | "quick_queue" => GameMode::Quick,
            "team_chaos" | "teams" => GameMode::TeamChaos,
            "tic_tac_toe" => GameMode::TicTacToe,
            "trivia" => GameMode::Trivia,
            "plinko" => GameMode::Plinko,
            "golf" => GameMode::Golf,
            other => return Err(UnknownMode(other.to_string())),
        };
        Ok(mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown game mode: {0}")]
pub struct UnknownMode(pub String);

/// Whether a machine takes part in scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    /// Connectivity lost; turn-ending timers are paused
    Reconnecting,
    /// Recovery exhausted; needs an operator
    OutOfRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEndReason {
    /// Machine signalled the destructive action finished
    Completed,
    /// Hard duration ran out
    TimeExpired,
    /// No action inside the grace window
    Afk,
    Gifted,
    PlayerLeft,
    MachineFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Afk,
    Left,
    TurnUsed,
}

/// Notifications published by a turn scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    RoundStarted {
        machine: String,
        player: Option<String>,
        generation: u64,
        mode: GameMode,
    },
    TurnEnded {
        machine: String,
        player: String,
        generation: u64,
        mode: GameMode,
        reason: TurnEndReason,
    },
    CommandAccepted {
        machine: String,
        player: String,
        commands: usize,
    },
    CommandRejected {
        machine: String,
        player: String,
        reason: String,
    },
    PlayerJoined {
        machine: String,
        player: String,
        position: usize,
    },
    PlayerRemoved {
        machine: String,
        player: String,
        reason: RemovalReason,
    },
    ChuteSensorTripped {
        machine: String,
        belt: u8,
        player: Option<String>,
    },
    MachineUnavailable {
        machine: String,
        reason: String,
    },
    MachineRestored {
        machine: String,
    },
    ModeChanged {
        machine: String,
        mode: GameMode,
    },
}

/// Rejections returned to callers as values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejected {
    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Input is locked while the machine settles")]
    InputLocked,

    #[error("Invalid command: {0}")]
    Invalid(String),

    #[error("Cannot join: {0}")]
    JoinDenied(String),

    #[error("Queue is full")]
    QueueFull,

    #[error("Not in the queue: {0}")]
    NotQueued(String),

    #[error("Machine is unavailable")]
    MachineUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip_through_from_str() {
        for mode in [
            GameMode::Single,
            GameMode::Quick,
            GameMode::TeamChaos,
            GameMode::TicTacToe,
            GameMode::Trivia,
            GameMode::Plinko,
            GameMode::Golf,
        ] {
            assert_eq!(mode.as_str().parse::<GameMode>(), Ok(mode));
        }
        assert_eq!("Tic-Tac-Toe".parse::<GameMode>(), Ok(GameMode::TicTacToe));
        assert!("bowling".parse::<GameMode>().is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SchedulerEvent::TurnEnded {
            machine: "claw1".to_string(),
            player: "alice".to_string(),
            generation: 2,
            mode: GameMode::Single,
            reason: TurnEndReason::TimeExpired,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "turn_ended");
        assert_eq!(json["reason"], "time_expired");
        assert_eq!(json["generation"], 2);
    }
}
