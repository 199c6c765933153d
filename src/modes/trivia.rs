//! Trivia: answering correctly earns one turn

use dashmap::DashSet;
use tracing::debug;

use crate::game::{GameMode, TurnEndReason};

use super::queue_mode::decode_moves;
use super::{Decoded, GameModePolicy, JoinDecision, JoinRequest, MessageContext};

pub struct TriviaPolicy {
    /// Lowercased names allowed to queue
    eligible: DashSet<String>,
}

impl TriviaPolicy {
    pub fn new() -> Self {
        Self {
            eligible: DashSet::new(),
        }
    }
}

impl Default for TriviaPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GameModePolicy for TriviaPolicy {
    fn mode(&self) -> GameMode {
        GameMode::Trivia
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        match decode_moves(ctx, text) {
            Decoded::GiftTurn(_) => Decoded::Rejected("Trivia turns cannot be gifted".to_string()),
            other => other,
        }
    }

    fn join_rule(&self, request: &JoinRequest) -> JoinDecision {
        if self.eligible.contains(&request.sender.to_lowercase()) {
            JoinDecision::Allowed {
                identity: request.sender.clone(),
            }
        } else {
            JoinDecision::Denied("Answer a question to earn a turn".to_string())
        }
    }

    fn on_turn_ended(&self, player: &str, reason: TurnEndReason) {
        // one answer buys one turn
        self.eligible.remove(&player.to_lowercase());
        debug!(player, ?reason, "Trivia turn used");
    }

    fn remove_after_turn(&self) -> bool {
        true
    }

    fn grant_eligibility(&self, player: &str) -> bool {
        self.eligible.insert(player.to_lowercase());
        true
    }
}
