//! Round lifecycle and round tokens

use std::time::Duration;

use tokio::time::Instant;

use serde::Serialize;

/// Identifies one round. Timers and hardware continuations capture it by
/// value and only act while it still matches the live round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RoundToken {
    pub generation: u64,
    pub player: String,
}

impl RoundToken {
    pub fn new(generation: u64, player: impl Into<String>) -> Self {
        Self {
            generation,
            player: player.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Idle,
    AwaitingFirstAction,
    Active,
    /// Destructive command queued, queue flushing to hardware
    Draining,
    /// Destructive command dispatched, waiting on the machine
    AwaitingHardwareReturn,
    Ended,
}

/// State of the current round on one machine
#[derive(Debug, Clone)]
pub struct Round {
    token: Option<RoundToken>,
    phase: RoundPhase,
    has_acted: bool,
    dropping: Option<RoundToken>,
    started_at: Option<Instant>,
}

impl Round {
    pub fn idle() -> Self {
        Self {
            token: None,
            phase: RoundPhase::Idle,
            has_acted: false,
            dropping: None,
            started_at: None,
        }
    }

    pub fn start(token: RoundToken) -> Self {
        Self {
            token: Some(token),
            phase: RoundPhase::AwaitingFirstAction,
            has_acted: false,
            dropping: None,
            started_at: Some(Instant::now()),
        }
    }

    pub fn token(&self) -> Option<&RoundToken> {
        self.token.as_ref()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn has_acted(&self) -> bool {
        self.has_acted
    }

    /// Time since the round started, while it is running
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .filter(|_| self.is_running())
            .map(|at| at.elapsed())
    }

    /// Token captured when the destructive action was submitted
    pub fn dropping(&self) -> Option<&RoundToken> {
        self.dropping.as_ref()
    }

    /// True while the round has not ended
    pub fn is_running(&self) -> bool {
        !matches!(self.phase, RoundPhase::Idle | RoundPhase::Ended)
    }

    /// True when `token` names this round and it has not ended
    pub fn is_live(&self, token: &RoundToken) -> bool {
        self.is_running() && self.token.as_ref() == Some(token)
    }

    pub fn accepts_input(&self) -> bool {
        matches!(
            self.phase,
            RoundPhase::AwaitingFirstAction | RoundPhase::Active
        )
    }

    pub fn mark_acted(&mut self) {
        self.has_acted = true;
        if self.phase == RoundPhase::AwaitingFirstAction {
            self.phase = RoundPhase::Active;
        }
    }

    pub fn mark_draining(&mut self) {
        if let Some(token) = &self.token {
            self.dropping = Some(token.clone());
            self.phase = RoundPhase::Draining;
        }
    }

    pub fn mark_awaiting_hardware(&mut self) {
        if self.phase == RoundPhase::Draining {
            self.phase = RoundPhase::AwaitingHardwareReturn;
        }
    }

    /// Transition to Ended. Returns false if `token` is stale or the round
    /// already ended, so only the first caller wins.
    pub fn end(&mut self, token: &RoundToken) -> bool {
        if !self.is_live(token) {
            return false;
        }
        self.phase = RoundPhase::Ended;
        true
    }
}

impl Default for Round {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_first_caller_wins() {
        let token = RoundToken::new(3, "alice");
        let mut round = Round::start(token.clone());

        assert!(round.end(&token));
        assert!(!round.end(&token));
        assert_eq!(round.phase(), RoundPhase::Ended);
    }

    #[test]
    fn stale_token_cannot_end_round() {
        let mut round = Round::start(RoundToken::new(4, "bob"));
        assert!(!round.end(&RoundToken::new(3, "bob")));
        assert!(!round.end(&RoundToken::new(4, "carol")));
        assert!(round.is_running());
    }

    #[test]
    fn first_action_moves_to_active() {
        let mut round = Round::start(RoundToken::new(1, "alice"));
        assert!(!round.has_acted());
        round.mark_acted();
        assert!(round.has_acted());
        assert_eq!(round.phase(), RoundPhase::Active);
    }

    #[test]
    fn draining_captures_dropping_token_and_blocks_input() {
        let token = RoundToken::new(9, "dave");
        let mut round = Round::start(token.clone());
        round.mark_acted();
        round.mark_draining();

        assert_eq!(round.dropping(), Some(&token));
        assert!(!round.accepts_input());

        round.mark_awaiting_hardware();
        assert_eq!(round.phase(), RoundPhase::AwaitingHardwareReturn);
    }

    #[test]
    fn idle_round_is_not_live() {
        let round = Round::idle();
        assert!(!round.is_running());
        assert!(!round.is_live(&RoundToken::new(0, "")));
    }
}
