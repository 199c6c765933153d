//! Tic-tac-toe: two players alternate drops

use crate::game::GameMode;

use super::queue_mode::decode_moves;
use super::{Decoded, GameModePolicy, MessageContext};

#[derive(Default)]
pub struct TicTacToePolicy;

impl TicTacToePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl GameModePolicy for TicTacToePolicy {
    fn mode(&self) -> GameMode {
        GameMode::TicTacToe
    }

    fn decode_message(&self, ctx: &MessageContext<'_>, text: &str) -> Decoded {
        decode_moves(ctx, text)
    }

    fn minimum_players(&self) -> usize {
        2
    }
}
