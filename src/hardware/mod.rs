//! Machine control abstraction and adapters

pub mod claw_tcp;
pub mod protocol;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::game::command::Direction;

pub use claw_tcp::ClawTcpController;
pub use simulated::SimulatedMachine;

/// Events raised by a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MachineEvent {
    Dropping,
    Recoiled,
    /// Claw is back over the win chute
    ReturnedHome,
    /// Claw is back in the middle of the playfield and ready for input
    ReturnedCenter,
    MotorTimeout { direction: Direction },
    ClawTimeout,
    ResetButtonPressed,
    ChuteSensorTripped { belt: u8 },
    PingSuccess { latency_ms: u64 },
    PingTimeout,
    Disconnected,
    Info { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipperDirection {
    Stopped = 0,
    Forward = 1,
    Home = 2,
}

/// Hardware adapter errors
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Machine not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Connection timed out")]
    ConnectTimeout,

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported action: {0}")]
    Unsupported(Direction),
}

/// Capability a turn scheduler depends on. Moves resolve once the physical
/// move window has elapsed; drop completion arrives as events.
#[async_trait]
pub trait MachineControl: Send + Sync {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// True while a drop or strike is physically in flight
    fn is_play_active(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<MachineEvent>;

    async fn connect(&self) -> Result<(), HardwareError>;

    async fn disconnect(&self);

    async fn move_forward(&self, duration: Duration) -> Result<(), HardwareError>;

    async fn move_backward(&self, duration: Duration) -> Result<(), HardwareError>;

    async fn move_left(&self, duration: Duration) -> Result<(), HardwareError>;

    async fn move_right(&self, duration: Duration) -> Result<(), HardwareError>;

    async fn raise(&self, _duration: Duration) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported(Direction::Raise))
    }

    async fn lower(&self, _duration: Duration) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported(Direction::Lower))
    }

    async fn press_drop(&self) -> Result<(), HardwareError>;

    async fn flipper(&self, direction: FlipperDirection) -> Result<(), HardwareError> {
        let _ = direction;
        Err(HardwareError::Unsupported(Direction::Strike))
    }

    async fn stop_move(&self) -> Result<(), HardwareError>;

    /// Clear controller fault state and re-home
    async fn reset(&self) -> Result<(), HardwareError>;
}
