//! WebSocket bridge for chat relays

pub mod handler;
pub mod protocol;
