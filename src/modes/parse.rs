//! Chat text to movement tokens

use std::time::Duration;

use crate::game::Direction;

/// Messages with more tokens than this are treated as chatter
pub const MAX_TOKENS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    Moves(Vec<(Direction, Duration)>),
    Gift(String),
    NotACommand,
}

/// Parse a chat line. Every token must be a move or the whole line is
/// chatter; anything after the first drop is ignored.
pub fn parse_message(text: &str, move_duration: Duration, short_duration: Duration) -> ParsedMessage {
    let msg = text.trim().to_lowercase();

    if let Some(target) = gift_target(&msg) {
        return ParsedMessage::Gift(target);
    }

    let tokens: Vec<&str> = msg.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() > MAX_TOKENS {
        return ParsedMessage::NotACommand;
    }

    let mut moves = Vec::with_capacity(tokens.len());
    for token in tokens {
        let Some(step) = parse_token(token, move_duration, short_duration) else {
            return ParsedMessage::NotACommand;
        };
        moves.push(step);
        if step.0 == Direction::Down {
            break;
        }
    }
    ParsedMessage::Moves(moves)
}

pub fn parse_token(token: &str, move_duration: Duration, short_duration: Duration) -> Option<(Direction, Duration)> {
    let step = match token {
        "f" | "forward" => (Direction::Forward, move_duration),
        "b" | "back" | "backward" => (Direction::Backward, move_duration),
        "l" | "left" => (Direction::Left, move_duration),
        "r" | "right" => (Direction::Right, move_duration),
        "fs" => (Direction::Forward, short_duration),
        "bs" => (Direction::Backward, short_duration),
        "ls" => (Direction::Left, short_duration),
        "rs" => (Direction::Right, short_duration),
        "d" | "drop" => (Direction::Down, Duration::ZERO),
        "s" | "stop" => (Direction::Stop, Duration::ZERO),
        _ => return None,
    };
    Some(step)
}

fn gift_target(msg: &str) -> Option<String> {
    let rest = msg
        .strip_prefix("gift turn ")
        .or_else(|| msg.strip_prefix("!gift "))?;
    let mut words = rest.split_whitespace();
    let target = words.next()?.trim_start_matches('@');
    if target.is_empty() || words.next().is_some() {
        return None;
    }
    Some(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVE: Duration = Duration::from_millis(200);
    const SHORT: Duration = Duration::from_millis(80);

    fn parse(text: &str) -> ParsedMessage {
        parse_message(text, MOVE, SHORT)
    }

    #[test]
    fn single_letters_are_moves() {
        assert_eq!(
            parse("f"),
            ParsedMessage::Moves(vec![(Direction::Forward, MOVE)])
        );
        assert_eq!(
            parse(" LS "),
            ParsedMessage::Moves(vec![(Direction::Left, SHORT)])
        );
        assert_eq!(
            parse("stop"),
            ParsedMessage::Moves(vec![(Direction::Stop, Duration::ZERO)])
        );
    }

    #[test]
    fn multi_command_stops_at_first_drop() {
        assert_eq!(
            parse("f l d r r"),
            ParsedMessage::Moves(vec![
                (Direction::Forward, MOVE),
                (Direction::Left, MOVE),
                (Direction::Down, Duration::ZERO),
            ])
        );
    }

    #[test]
    fn any_unknown_token_makes_it_chatter() {
        assert_eq!(parse("f hello"), ParsedMessage::NotACommand);
        assert_eq!(parse("great job"), ParsedMessage::NotACommand);
        assert_eq!(parse(""), ParsedMessage::NotACommand);
    }

    #[test]
    fn long_messages_are_chatter() {
        assert!(matches!(parse("f f f f f f f f f"), ParsedMessage::Moves(_)));
        assert_eq!(parse("f f f f f f f f f f"), ParsedMessage::NotACommand);
    }

    #[test]
    fn gift_turn_extracts_target() {
        assert_eq!(parse("gift turn @Bob"), ParsedMessage::Gift("bob".to_string()));
        assert_eq!(parse("!gift carol"), ParsedMessage::Gift("carol".to_string()));
        assert_eq!(parse("gift turn bob and carol"), ParsedMessage::NotACommand);
    }
}
