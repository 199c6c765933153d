//! Player roster with a current-turn cursor

use std::collections::VecDeque;

use serde::Serialize;

/// Player queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Player not in queue: {0}")]
    NotFound(String),

    #[error("Queue is full")]
    Full,
}

/// Ordered roster of participants. The cursor points at the player whose
/// turn it is and is always in bounds while the queue is non-empty.
#[derive(Debug, Clone)]
pub struct PlayerQueue {
    players: VecDeque<String>,
    cursor: Option<usize>,
    /// 0 means unbounded
    max_size: usize,
    case_sensitive: bool,
}

impl PlayerQueue {
    pub fn new(max_size: usize, case_sensitive: bool) -> Self {
        Self {
            players: VecDeque::new(),
            cursor: None,
            max_size,
            case_sensitive,
        }
    }

    /// Identity comparison honoring the configured casing rule
    pub fn same_identity(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Position of `id` in the queue
    pub fn position(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| self.same_identity(p, id))
    }

    /// Append a player. Returns the existing position if already queued.
    pub fn add_single_player(&mut self, id: &str) -> Result<usize, QueueError> {
        if let Some(pos) = self.position(id) {
            return Ok(pos);
        }
        if self.max_size > 0 && self.players.len() >= self.max_size {
            return Err(QueueError::Full);
        }

        self.players.push_back(id.to_string());
        if self.cursor.is_none() {
            self.cursor = Some(0);
        }
        Ok(self.players.len() - 1)
    }

    /// Remove a player. When the removed entry sits at or before the cursor,
    /// the cursor steps back so the next advance lands on the player that
    /// followed the removed one.
    pub fn remove_single_player(&mut self, id: &str) -> bool {
        let Some(idx) = self.position(id) else {
            return false;
        };
        self.players.remove(idx);

        if self.players.is_empty() {
            self.cursor = None;
            return true;
        }

        if let Some(cursor) = self.cursor {
            if idx <= cursor {
                self.cursor = Some(if cursor == 0 {
                    self.players.len() - 1
                } else {
                    cursor - 1
                });
            }
        }
        true
    }

    /// Swap `old` for `new` in place. If `new` is already queued elsewhere it
    /// is moved into `old`'s slot.
    pub fn replace(&mut self, old: &str, new: &str) -> Result<(), QueueError> {
        if self.position(old).is_none() {
            return Err(QueueError::NotFound(old.to_string()));
        }
        if self.same_identity(old, new) {
            return Ok(());
        }

        if self.position(new).is_some() {
            let cursor_on_old = self.current_player().is_some_and(|c| self.same_identity(c, old));
            self.remove_single_player(new);
            if cursor_on_old {
                // removal may have shifted the cursor off `old`
                self.cursor = self.position(old);
            }
        }

        let idx = self
            .position(old)
            .ok_or_else(|| QueueError::NotFound(old.to_string()))?;
        self.players[idx] = new.to_string();
        Ok(())
    }

    /// Force the cursor onto `id`
    pub fn select_player(&mut self, id: &str) -> Result<(), QueueError> {
        let idx = self
            .position(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        self.cursor = Some(idx);
        Ok(())
    }

    /// Advance the cursor, wrapping at the end
    pub fn get_next_player(&mut self) -> Option<String> {
        if self.players.is_empty() {
            self.cursor = None;
            return None;
        }
        let next = match self.cursor {
            Some(cursor) => (cursor + 1) % self.players.len(),
            None => 0,
        };
        self.cursor = Some(next);
        self.players.get(next).cloned()
    }

    pub fn current_player(&self) -> Option<&str> {
        self.cursor
            .and_then(|c| self.players.get(c))
            .map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            players: self.players.iter().cloned().collect(),
            current: self.current_player().map(str::to_string),
        }
    }
}

impl Default for PlayerQueue {
    fn default() -> Self {
        Self::new(0, false)
    }
}

/// Serializable view of the roster
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub players: Vec<String>,
    pub current: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(names: &[&str]) -> PlayerQueue {
        let mut q = PlayerQueue::default();
        for name in names {
            q.add_single_player(name).unwrap();
        }
        q
    }

    #[test]
    fn add_is_idempotent() {
        let mut q = queue_of(&["alice", "bob"]);
        assert_eq!(q.add_single_player("bob"), Ok(1));
        assert_eq!(q.add_single_player("BOB"), Ok(1));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn case_sensitive_queue_keeps_distinct_casing() {
        let mut q = PlayerQueue::new(0, true);
        q.add_single_player("bob").unwrap();
        assert_eq!(q.add_single_player("Bob"), Ok(1));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn full_queue_rejects_new_players() {
        let mut q = PlayerQueue::new(2, false);
        q.add_single_player("a").unwrap();
        q.add_single_player("b").unwrap();
        assert_eq!(q.add_single_player("c"), Err(QueueError::Full));
        // existing players still resolve
        assert_eq!(q.add_single_player("a"), Ok(0));
    }

    #[test]
    fn first_player_becomes_current() {
        let q = queue_of(&["alice"]);
        assert_eq!(q.current_player(), Some("alice"));
    }

    #[test]
    fn next_player_wraps() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert_eq!(q.get_next_player().as_deref(), Some("b"));
        assert_eq!(q.get_next_player().as_deref(), Some("c"));
        assert_eq!(q.get_next_player().as_deref(), Some("a"));
    }

    #[test]
    fn removing_current_player_advances_to_follower() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.select_player("b").unwrap();
        assert!(q.remove_single_player("b"));
        assert_eq!(q.get_next_player().as_deref(), Some("c"));
    }

    #[test]
    fn removing_current_player_at_head_wraps_cursor() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert!(q.remove_single_player("a"));
        assert_eq!(q.get_next_player().as_deref(), Some("b"));
    }

    #[test]
    fn removing_current_player_at_tail_wraps_to_head() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.select_player("c").unwrap();
        q.remove_single_player("c");
        assert_eq!(q.get_next_player().as_deref(), Some("a"));
    }

    #[test]
    fn removing_before_cursor_keeps_current() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.select_player("c").unwrap();
        q.remove_single_player("a");
        assert_eq!(q.current_player(), Some("c"));
    }

    #[test]
    fn removing_after_cursor_keeps_current() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.remove_single_player("c");
        assert_eq!(q.current_player(), Some("a"));
        assert_eq!(q.get_next_player().as_deref(), Some("b"));
    }

    #[test]
    fn removing_last_player_resets_cursor() {
        let mut q = queue_of(&["a"]);
        q.remove_single_player("a");
        assert!(q.is_empty());
        assert_eq!(q.current_player(), None);
        assert_eq!(q.get_next_player(), None);
    }

    #[test]
    fn remove_unknown_player_is_noop() {
        let mut q = queue_of(&["a"]);
        assert!(!q.remove_single_player("zed"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn replace_preserves_position() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.select_player("b").unwrap();
        q.replace("b", "zoe").unwrap();
        assert_eq!(q.position("zoe"), Some(1));
        assert_eq!(q.current_player(), Some("zoe"));
        assert!(!q.contains("b"));
    }

    #[test]
    fn replace_with_queued_player_moves_them() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.select_player("b").unwrap();
        q.replace("b", "a").unwrap();
        assert_eq!(q.snapshot().players, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(q.current_player(), Some("a"));
    }

    #[test]
    fn replace_and_select_fail_for_absent_player() {
        let mut q = queue_of(&["a"]);
        assert_eq!(
            q.replace("nobody", "x"),
            Err(QueueError::NotFound("nobody".to_string()))
        );
        assert_eq!(
            q.select_player("nobody"),
            Err(QueueError::NotFound("nobody".to_string()))
        );
    }

    #[test]
    fn clear_empties_and_resets_cursor() {
        let mut q = queue_of(&["a", "b"]);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.current_player(), None);
    }
}
