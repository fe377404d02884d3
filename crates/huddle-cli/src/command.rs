//! Line commands.
//!
//! Every line read from stdin is either a slash command or a message body
//! for the current room.

use huddle_core::RoomId;
use thiserror::Error;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/join <room>`: select a room.
    Join(RoomId),
    /// `/typing`: keystroke in the current room's composer.
    Typing,
    /// `/open`: reopen the workspace after a close.
    Open,
    /// `/close`: leave the workspace but keep running.
    Close,
    /// `/quit`: stop.
    Quit,
    /// Anything else: send to the current room.
    Say(String),
}

/// Rejected input line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// `/join` without a room.
    #[error("usage: /join <room>")]
    MissingRoom,

    /// Unrecognised slash command.
    #[error("unknown command: /{0}")]
    Unknown(String),
}

/// Parse one line. Blank lines yield `Ok(None)`.
///
/// A leading `//` escapes a message body that starts with a slash.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Some(escaped) = trimmed.strip_prefix("//") {
        return Ok(Some(Command::Say(format!("/{escaped}"))));
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.trim_end_matches(['\r', '\n']).to_owned())));
    };

    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let command = match name {
        "join" => Command::Join(RoomId::new(arg.trim()).map_err(|_| CommandError::MissingRoom)?),
        "typing" => Command::Typing,
        "open" => Command::Open,
        "close" => Command::Close,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_owned())),
    };

    Ok(Some(command))
}
