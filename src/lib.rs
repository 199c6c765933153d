//! Claw Turn Server
//!
//! Runs chat-driven claw machines as turn-based games. Each machine gets a
//! turn scheduler that decides whose turn it is, serializes moves to the
//! hardware and races round timers against hardware completion events.
//!
//! Modules are exposed for the binary and integration tests.

pub mod app;
pub mod config;
pub mod game;
pub mod hardware;
pub mod http;
pub mod modes;
pub mod notify;
pub mod queue;
pub mod util;
pub mod ws;
