//! WebSocket protocol message definitions
//! These are the wire types between the chat bridge and the server

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{JoinOutcome, SchedulerEvent, Submitted};

/// Messages sent from the chat bridge to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// A chat line to decode as commands
    Chat {
        machine: String,
        sender: String,
        text: String,
    },

    Join {
        machine: String,
        sender: String,
        #[serde(default)]
        team: Option<String>,
    },

    Leave {
        machine: String,
        sender: String,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to the chat bridge
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
        machines: Vec<String>,
    },

    /// Scheduler notification from any machine
    Event { event: SchedulerEvent },

    /// Outcome of a chat line
    Submitted {
        machine: String,
        sender: String,
        result: Submitted,
    },

    Joined {
        machine: String,
        outcome: JoinOutcome,
    },

    Left {
        machine: String,
        sender: String,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
