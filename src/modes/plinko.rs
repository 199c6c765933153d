//! Plinko: the claw only slides left and right before dropping

use crate::game::{Direction, GameMode};

use super::queue_mode::decode_moves;
use super::{Decoded, GameModePolicy, MessageContext};

#[derive(Default)]
pub struct PlinkoPolicy;

impl PlinkoPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl GameModePolicy for PlinkoPolicy {
    fn mode(&self) -> GameMode {
        GameMode::Plinko
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        match decode_moves(ctx, text) {
            Decoded::Commands(cmds) => {
                let allowed = cmds.iter().all(|c| {
                    matches!(
                        c.direction,
                        Direction::Left | Direction::Right | Direction::Down | Direction::Stop
                    )
                });
                if allowed {
                    Decoded::Commands(cmds)
                } else {
                    Decoded::Rejected("Only left, right and drop work in plinko".to_string())
                }
            }
            other => other,
        }
    }

    fn completion_signal(&self) -> super::CompletionSignal {
        super::CompletionSignal::Recoiled
    }
}
