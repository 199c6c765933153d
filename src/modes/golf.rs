//! Golf: position the club, then strike

use std::time::Duration;

use crate::game::{Direction, GameMode};

use super::queue_mode::decode_moves;
use super::{CompletionSignal, Decoded, GameModePolicy, MessageContext};

#[derive(Default)]
pub struct GolfPolicy;

impl GolfPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Lower the club, swing, raise it and swing back home
    fn strike(ctx: &MessageContext<'_>) -> Decoded {
        Decoded::Group(vec![
            ctx.command(Direction::Lower, ctx.move_duration),
            ctx.command(Direction::Strike, Duration::ZERO),
            ctx.command(Direction::Raise, ctx.move_duration),
            ctx.command(Direction::CounterStrike, Duration::ZERO),
        ])
    }
}

impl GameModePolicy for GolfPolicy {
    fn mode(&self) -> GameMode {
        GameMode::Golf
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        match text.trim().to_lowercase().as_str() {
            "h" | "hit" => Self::strike(ctx),
            _ => match decode_moves(ctx, text) {
                Decoded::Commands(cmds) if cmds.iter().any(|c| c.direction == Direction::Down) => {
                    Decoded::Rejected("Use h to hit".to_string())
                }
                other => other,
            },
        }
    }

    fn completion_signal(&self) -> CompletionSignal {
        CompletionSignal::SequenceFinished
    }
}
