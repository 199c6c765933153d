//! Per-machine command FIFO with a single-flight drain guard

use std::collections::VecDeque;

use tracing::debug;

use crate::game::command::{Command, Direction};
use crate::hardware::{FlipperDirection, HardwareError, MachineControl};

/// Returned when the queue refuses new input
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Input is locked while the machine settles")]
pub struct InputLocked;

/// Pending commands for one machine
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    draining: bool,
    input_locked: bool,
    /// Group of the command most recently handed to the drain loop
    active_group: Option<u64>,
    next_group: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single command. A destructive command clears the queue first
    /// and becomes the only pending entry.
    pub fn enqueue(&mut self, cmd: Command) -> Result<usize, InputLocked> {
        self.push_all(vec![cmd], false)
    }

    /// Append several commands in order. If any is destructive, everything
    /// queued before the batch is discarded.
    pub fn enqueue_batch(&mut self, cmds: Vec<Command>) -> Result<usize, InputLocked> {
        self.push_all(cmds, false)
    }

    /// Append an atomic sequence. Group members survive `clear_pending` once
    /// the drain loop has started on the group.
    pub fn enqueue_group(&mut self, cmds: Vec<Command>) -> Result<usize, InputLocked> {
        self.push_all(cmds, true)
    }

    fn push_all(&mut self, mut cmds: Vec<Command>, grouped: bool) -> Result<usize, InputLocked> {
        if self.input_locked {
            return Err(InputLocked);
        }

        if cmds.iter().any(Command::is_destructive) {
            debug!(discarded = self.pending.len(), "Destructive command clears queue");
            self.pending.clear();
            self.active_group = None;
        }

        if grouped {
            self.next_group += 1;
            let group = self.next_group;
            for cmd in &mut cmds {
                cmd.group = Some(group);
            }
        }

        self.pending.extend(cmds);
        Ok(self.pending.len())
    }

    /// Claim the drain loop. Returns false if one is already running.
    pub fn try_start_drain(&mut self) -> bool {
        if self.draining || self.pending.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Pop the next command for the running drain loop. Releases the drain
    /// claim when the queue is empty.
    pub fn next_for_drain(&mut self) -> Option<Command> {
        match self.pending.pop_front() {
            Some(cmd) => {
                self.active_group = cmd.group;
                Some(cmd)
            }
            None => {
                self.draining = false;
                self.active_group = None;
                None
            }
        }
    }

    /// Drop every pending command
    pub fn clear(&mut self) {
        self.pending.clear();
        self.active_group = None;
    }

    /// Drop pending commands except the remainder of a group already being
    /// drained
    pub fn clear_pending(&mut self) {
        match self.active_group {
            Some(group) => {
                let keep = self
                    .pending
                    .iter()
                    .take_while(|c| c.group == Some(group))
                    .count();
                self.pending.truncate(keep);
            }
            None => self.pending.clear(),
        }
    }

    pub fn lock_input(&mut self) {
        self.input_locked = true;
    }

    pub fn unlock_input(&mut self) {
        self.input_locked = false;
    }

    pub fn is_input_locked(&self) -> bool {
        self.input_locked
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Translate a command into the matching machine call and await it
pub async fn dispatch(machine: &dyn MachineControl, cmd: &Command) -> Result<(), HardwareError> {
    match cmd.direction {
        Direction::Forward => machine.move_forward(cmd.duration).await,
        Direction::Backward => machine.move_backward(cmd.duration).await,
        Direction::Left => machine.move_left(cmd.duration).await,
        Direction::Right => machine.move_right(cmd.duration).await,
        Direction::Raise => machine.raise(cmd.duration).await,
        Direction::Lower => machine.lower(cmd.duration).await,
        Direction::Down => machine.press_drop().await,
        Direction::Strike => machine.flipper(FlipperDirection::Forward).await,
        Direction::CounterStrike => machine.flipper(FlipperDirection::Home).await,
        Direction::Stop | Direction::None => machine.stop_move().await,
    }
}
