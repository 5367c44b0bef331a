//! Message definitions
//!
//! Three kinds of messages:
//! - `ControlMessage`: internal events delivered to a client's own queue
//! - `ClientLine`: a parsed line received from the remote user
//! - `Reply`: acknowledgment lines written back to the remote user
//!
//! The wire format is newline-delimited text. Lines starting with `/` are
//! commands, anything else is a chat message for the current room.

use std::fmt;

/// Error text sent when posting outside a room
pub const NOT_IN_ROOM: &str = "Need to be inside a room to post a message";

/// Error text sent when leaving without a room
pub const NO_ROOM_TO_LEAVE: &str = "There is no room to leave from";

/// Error text sent to every client when the server stops
pub const SERVER_EXITING: &str = "Server is exiting";

/// Notice sent to a client entering a room that is being closed
pub const ROOM_CLOSING: &str =
    "This room was empty and now is closing. Please wait a second or choose another room.";

/// Event processed by a client's main loop
///
/// The set of variants is closed; the main loop matches on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Text posted by another member of `source_room`
    RoomBroadcast { text: String, source_room: String },
    /// A line read from the remote stream
    RemoteLine(String),
    /// The remote stream reached end-of-stream or failed
    RemoteClosed,
    /// The server asks this client to terminate
    Stop,
}

/// A line received from the remote user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Plain chat text for the current room
    Message(String),
    /// `/enter <room>`
    EnterRoom(String),
    /// `/leave`
    LeaveRoom,
    /// `/exit`
    Exit,
    /// Malformed command, with the reason reported back
    Invalid(String),
}

impl ClientLine {
    /// Parse one line (without its terminator)
    pub fn parse(line: &str) -> Self {
        if !line.starts_with('/') {
            return ClientLine::Message(line.to_string());
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match (command, args.as_slice()) {
            ("/enter", [room]) => ClientLine::EnterRoom(room.to_string()),
            ("/enter", _) => invalid("/enter command requires exactly one argument"),
            ("/leave", []) => ClientLine::LeaveRoom,
            ("/leave", _) => invalid("/leave command does not have arguments"),
            ("/exit", []) => ClientLine::Exit,
            ("/exit", _) => invalid("/exit command does not have arguments"),
            _ => invalid("unknown command"),
        }
    }
}

fn invalid(reason: &str) -> ClientLine {
    ClientLine::Invalid(reason.to_string())
}

/// Acknowledgment written to the remote user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error(String),
}

impl Reply {
    pub fn error(reason: impl Into<String>) -> Self {
        Reply::Error(reason.into())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("[OK]"),
            Reply::Error(reason) => write!(f, "[Error: {}]", reason),
        }
    }
}

/// Format a chat message as delivered to the other members of a room
pub fn format_broadcast(room: &str, sender: &str, text: &str) -> String {
    format!("[{}]{} says '{}'", room, sender, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_message() {
        assert_eq!(
            ClientLine::parse("Hello from client0"),
            ClientLine::Message("Hello from client0".to_string())
        );
        assert_eq!(ClientLine::parse(""), ClientLine::Message(String::new()));
    }

    #[test]
    fn test_parse_enter() {
        assert_eq!(
            ClientLine::parse("/enter room"),
            ClientLine::EnterRoom("room".to_string())
        );
        assert_eq!(
            ClientLine::parse("/enter   lobby  "),
            ClientLine::EnterRoom("lobby".to_string())
        );
        assert_eq!(
            ClientLine::parse("/enter"),
            ClientLine::Invalid("/enter command requires exactly one argument".to_string())
        );
        assert_eq!(
            ClientLine::parse("/enter a b"),
            ClientLine::Invalid("/enter command requires exactly one argument".to_string())
        );
    }

    #[test]
    fn test_parse_leave_and_exit() {
        assert_eq!(ClientLine::parse("/leave"), ClientLine::LeaveRoom);
        assert_eq!(ClientLine::parse("/exit"), ClientLine::Exit);
        assert!(matches!(ClientLine::parse("/leave now"), ClientLine::Invalid(_)));
        assert!(matches!(ClientLine::parse("/exit 1"), ClientLine::Invalid(_)));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            ClientLine::parse("/dance"),
            ClientLine::Invalid("unknown command".to_string())
        );
        assert_eq!(
            ClientLine::parse("/"),
            ClientLine::Invalid("unknown command".to_string())
        );
    }

    #[test]
    fn test_reply_format() {
        assert_eq!(Reply::Ok.to_string(), "[OK]");
        assert_eq!(
            Reply::error(NO_ROOM_TO_LEAVE).to_string(),
            "[Error: There is no room to leave from]"
        );
    }

    #[test]
    fn test_format_broadcast() {
        assert_eq!(
            format_broadcast("room", "client-1", "Hello"),
            "[room]client-1 says 'Hello'"
        );
    }
}
