//! Line protocol spoken by the claw controller board
//!
//! Outbound: `<seq> <command> [args]\n`
//! Inbound:  `<code>[:<seq>] [payload]`

use crate::game::command::Direction;

use super::MachineEvent;

pub const EVENT_BELT_SENSOR: u16 = 100;
pub const EVENT_PONG: u16 = 101;
pub const EVENT_RESET_BUTTON: u16 = 102;
pub const EVENT_DROPPING_CLAW: u16 = 103;
pub const EVENT_DROPPED_CLAW: u16 = 104;
pub const EVENT_RECOILED_CLAW: u16 = 105;
pub const EVENT_RETURNED_HOME: u16 = 106;
pub const EVENT_RETURNED_CENTER: u16 = 107;
pub const EVENT_FAILSAFE_LEFT: u16 = 300;
pub const EVENT_FAILSAFE_RIGHT: u16 = 301;
pub const EVENT_FAILSAFE_FORWARD: u16 = 302;
pub const EVENT_FAILSAFE_BACKWARD: u16 = 303;
pub const EVENT_FAILSAFE_UP: u16 = 304;
pub const EVENT_FAILSAFE_DOWN: u16 = 305;
pub const EVENT_FAILSAFE_CLAW: u16 = 306;
pub const EVENT_FAILSAFE_FLIPPER: u16 = 307;
pub const EVENT_INFO: u16 = 900;

/// One parsed line from the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerLine {
    pub code: u16,
    pub seq: Option<u32>,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty line")]
    Empty,

    #[error("Invalid event code: {0}")]
    InvalidCode(String),

    #[error("Invalid sequence number: {0}")]
    InvalidSequence(String),
}

pub fn parse_line(line: &str) -> Result<ControllerLine, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let (head, payload) = match line.split_once(' ') {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let (code, seq) = match head.split_once(':') {
        Some((code, seq)) => {
            let seq = seq
                .parse()
                .map_err(|_| ProtocolError::InvalidSequence(seq.to_string()))?;
            (code, Some(seq))
        }
        None => (head, None),
    };

    let code = code
        .parse()
        .map_err(|_| ProtocolError::InvalidCode(code.to_string()))?;

    Ok(ControllerLine {
        code,
        seq,
        payload: payload.to_string(),
    })
}

/// Map a controller line to a machine event. Pongs are handled by the ping
/// tracker and limit switches are informational, so both map to `None`.
pub fn to_event(line: &ControllerLine) -> Option<MachineEvent> {
    let event = match line.code {
        EVENT_BELT_SENSOR => MachineEvent::ChuteSensorTripped {
            belt: line.payload.parse().unwrap_or(1),
        },
        EVENT_RESET_BUTTON => MachineEvent::ResetButtonPressed,
        EVENT_DROPPING_CLAW => MachineEvent::Dropping,
        EVENT_RECOILED_CLAW => MachineEvent::Recoiled,
        EVENT_RETURNED_HOME => MachineEvent::ReturnedHome,
        EVENT_RETURNED_CENTER => MachineEvent::ReturnedCenter,
        EVENT_FAILSAFE_LEFT => motor(Direction::Left),
        EVENT_FAILSAFE_RIGHT => motor(Direction::Right),
        EVENT_FAILSAFE_FORWARD => motor(Direction::Forward),
        EVENT_FAILSAFE_BACKWARD => motor(Direction::Backward),
        EVENT_FAILSAFE_UP => motor(Direction::Raise),
        EVENT_FAILSAFE_DOWN => motor(Direction::Lower),
        EVENT_FAILSAFE_FLIPPER => motor(Direction::Strike),
        EVENT_FAILSAFE_CLAW => MachineEvent::ClawTimeout,
        EVENT_INFO => MachineEvent::Info {
            message: line.payload.clone(),
        },
        _ => return None,
    };
    Some(event)
}

fn motor(direction: Direction) -> MachineEvent {
    MachineEvent::MotorTimeout { direction }
}

pub fn encode_command(seq: u32, command: &str) -> String {
    format!("{} {}\n", seq, command)
}

/// Wire form of a timed move
pub fn move_command(direction: Direction, duration_ms: u64) -> Option<String> {
    let dir = match direction {
        Direction::Forward => "f",
        Direction::Backward => "b",
        Direction::Left => "l",
        Direction::Right => "r",
        Direction::Raise => "u",
        Direction::Lower => "dn",
        Direction::Down => "d",
        Direction::Stop | Direction::None => "s",
        Direction::Strike | Direction::CounterStrike => return None,
    };
    Some(format!("{} {}", dir, duration_ms))
}
