//! Per-mode hooks plugged into a turn scheduler

pub mod golf;
pub mod parse;
pub mod plinko;
pub mod queue_mode;
pub mod team;
pub mod tic_tac_toe;
pub mod trivia;

use std::sync::Arc;
use std::time::Duration;

use crate::game::{Command, GameMode, TurnEndReason};

pub use golf::GolfPolicy;
pub use plinko::PlinkoPolicy;
pub use queue_mode::QueueModePolicy;
pub use team::TeamChaosPolicy;
pub use tic_tac_toe::TicTacToePolicy;
pub use trivia::TriviaPolicy;

/// What a chat message means for the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Moves to queue in order
    Commands(Vec<Command>),
    /// Atomic sequence that must not be split by a round change
    Group(Vec<Command>),
    GiftTurn(String),
    /// Ordinary chat
    NotACommand,
    Rejected(String),
}

/// Input to `decode_message`
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    /// Queue identity that will own the commands
    pub participant: &'a str,
    pub machine: &'a str,
    pub move_duration: Duration,
    pub short_move_duration: Duration,
}

impl MessageContext<'_> {
    pub fn command(&self, direction: crate::game::Direction, duration: Duration) -> Command {
        Command::new(direction, duration, self.participant, self.machine)
    }
}

/// A request to enter the player queue
#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    pub sender: String,
    pub team: Option<String>,
}

impl JoinRequest {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            team: None,
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
    /// Enqueue under this identity
    Allowed { identity: String },
    Denied(String),
}

/// Machine event that completes a destructive action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// Turn ends as soon as the drop is dispatched
    DropDispatched,
    Recoiled,
    ReturnedHome,
    /// Turn ends once the queued sequence has fully drained
    SequenceFinished,
}

/// Mode-specific behavior. One scheduler runs any policy.
pub trait GameModePolicy: Send + Sync {
    fn mode(&self) -> GameMode;

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded;

    fn join_rule(&self, request: &JoinRequest) -> JoinDecision {
        JoinDecision::Allowed {
            identity: request.sender.clone(),
        }
    }

    /// Queue identity that acts for `sender`
    fn participant_for(&self, sender: &str) -> String {
        sender.to_string()
    }

    fn on_round_started(&self, _player: Option<&str>) {}

    fn on_turn_ended(&self, _player: &str, _reason: TurnEndReason) {}

    fn minimum_players(&self) -> usize {
        1
    }

    /// Players leave the queue after one turn
    fn remove_after_turn(&self) -> bool {
        false
    }

    fn completion_signal(&self) -> CompletionSignal {
        CompletionSignal::ReturnedHome
    }

    /// Operator grant of mode-specific eligibility. Returns false when the
    /// mode has no such concept.
    fn grant_eligibility(&self, _player: &str) -> bool {
        false
    }
}

pub fn policy_for(mode: GameMode) -> Arc<dyn GameModePolicy> {
    match mode {
        GameMode::Single => Arc::new(QueueModePolicy::single()),
        GameMode::Quick => Arc::new(QueueModePolicy::quick()),
        GameMode::TeamChaos => Arc::new(TeamChaosPolicy::new()),
        GameMode::TicTacToe => Arc::new(TicTacToePolicy::new()),
        GameMode::Trivia => Arc::new(TriviaPolicy::new()),
        GameMode::Plinko => Arc::new(PlinkoPolicy::new()),
        GameMode::Golf => Arc::new(GolfPolicy::new()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ctx(participant: &str) -> MessageContext<'_> {
        MessageContext {
            participant,
            machine: "claw1",
            move_duration: Duration::from_millis(200),
            short_move_duration: Duration::from_millis(80),
        }
    }

    pub fn directions(decoded: &Decoded) -> Vec<crate::game::Direction> {
        match decoded {
            Decoded::Commands(cmds) | Decoded::Group(cmds) => {
                cmds.iter().map(|c| c.direction).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_matching_mode() {
        for mode in [
            GameMode::Single,
            GameMode::Quick,
            GameMode::TeamChaos,
            GameMode::TicTacToe,
            GameMode::Trivia,
            GameMode::Plinko,
            GameMode::Golf,
        ] {
            assert_eq!(policy_for(mode).mode(), mode);
        }
    }
}
