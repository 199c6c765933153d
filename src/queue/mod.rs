//! Player roster and per-machine command queue

pub mod command_queue;
pub mod player_queue;

pub use command_queue::{CommandQueue, InputLocked};
pub use player_queue::{PlayerQueue, QueueError, QueueSnapshot};
