//! Single-queue and quick-queue modes

use crate::game::GameMode;

use super::parse::{parse_message, ParsedMessage};
use super::{CompletionSignal, Decoded, GameModePolicy, MessageContext};

/// Players take turns in join order. Single queue waits for the claw to get
/// back home before advancing, quick queue advances as soon as the drop is
/// sent.
pub struct QueueModePolicy {
    mode: GameMode,
    completion: CompletionSignal,
}

impl QueueModePolicy {
    pub fn single() -> Self {
        Self {
            mode: GameMode::Single,
            completion: CompletionSignal::ReturnedHome,
        }
    }

    pub fn quick() -> Self {
        Self {
            mode: GameMode::Quick,
            completion: CompletionSignal::DropDispatched,
        }
    }
}

impl GameModePolicy for QueueModePolicy {
    fn mode(&self) -> GameMode {
        self.mode
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        decode_moves(ctx, text)
    }

    fn completion_signal(&self) -> CompletionSignal {
        self.completion
    }
}

/// Standard claw vocabulary shared by most modes
pub(crate) fn decode_moves(ctx: &MessageContext<'_>, text: &str) -> Decoded {
    match parse_message(text, ctx.move_duration, ctx.short_move_duration) {
        ParsedMessage::Moves(moves) => Decoded::Commands(
            moves
                .into_iter()
                .map(|(direction, duration)| ctx.command(direction, duration))
                .collect(),
        ),
        ParsedMessage::Gift(target) => Decoded::GiftTurn(target),
        ParsedMessage::NotACommand => Decoded::NotACommand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Direction;
    use crate::modes::test_support::{ctx, directions};

    #[test]
    fn decodes_moves_owned_by_participant() {
        let policy = QueueModePolicy::single();
        let decoded = policy.decode_message(&ctx("alice"), "f r d");
        assert_eq!(
            directions(&decoded),
            vec![Direction::Forward, Direction::Right, Direction::Down]
        );
        if let Decoded::Commands(cmds) = decoded {
            assert!(cmds.iter().all(|c| c.player == "alice" && c.machine == "claw1"));
        }
    }

    #[test]
    fn quick_mode_completes_on_dispatch() {
        assert_eq!(
            QueueModePolicy::quick().completion_signal(),
            CompletionSignal::DropDispatched
        );
        assert_eq!(
            QueueModePolicy::single().completion_signal(),
            CompletionSignal::ReturnedHome
        );
    }

    #[test]
    fn gift_is_passed_through() {
        let decoded = QueueModePolicy::single().decode_message(&ctx("alice"), "gift turn bob");
        assert_eq!(decoded, Decoded::GiftTurn("bob".to_string()));
    }
}
