//! Slash-command parsing and execution.
//!
//! Matching is substring-based and the first recognized command wins, in
//! the order of the help text. Unrecognized or malformed commands are
//! deliberately silent no-ops.

use uuid::Uuid;

use crate::session::{Directory, Frame};

/// Fixed reply for `/help`.
pub const HELP_TEXT: &str = "Commands:\n    /timestamp\n    /listusers\n    /whisper \"<user>\" <message>\n    /help\n    /quit\n";

/// A recognized command, parsed from a raw slash-prefixed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/timestamp` — toggle the sender's timestamp display.
    ToggleTimestamp,
    /// `/listusers` — list current sessions, to the sender only.
    ListUsers,
    /// `/whisper "<name>" <text>` or `/whisper <name> <text>`.
    Whisper { target: String, text: String },
    /// `/help` — fixed command list, to the sender only.
    Help,
    /// `/quit` — leave and close the connection.
    Quit,
}

/// Parse a raw command line. `None` means the line is unrecognized or
/// malformed and produces no effect at all.
pub fn parse(line: &str) -> Option<Command> {
    if line.contains("/timestamp") {
        return Some(Command::ToggleTimestamp);
    }
    if line.contains("/listusers") {
        return Some(Command::ListUsers);
    }
    if line.contains("/whisper") {
        return parse_whisper(line);
    }
    if line.contains("/help") {
        return Some(Command::Help);
    }
    if line.contains("/quit") {
        return Some(Command::Quit);
    }
    None
}

/// Whisper grammar: after the `/whisper` token, either a `"`-quoted
/// target followed by the message text, or a bare whitespace-delimited
/// token followed by the text. A missing target or an unterminated quote
/// parses as malformed; empty text is allowed and delivered as-is.
fn parse_whisper(line: &str) -> Option<Command> {
    let rest = line.split_once("/whisper").map(|(_, r)| r)?.trim_start();
    if let Some(quoted) = rest.strip_prefix('"') {
        let (target, text) = quoted.split_once('"')?;
        if target.is_empty() {
            return None;
        }
        Some(Command::Whisper {
            target: target.to_string(),
            text: text.trim().to_string(),
        })
    } else {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let target = parts.next().filter(|t| !t.is_empty())?;
        let text = parts.next().unwrap_or("").trim();
        Some(Command::Whisper {
            target: target.to_string(),
            text: text.to_string(),
        })
    }
}

/// Execute a parsed command on behalf of `sender` against the live
/// directory. Runs inside the dispatch loop, so it may mutate the
/// directory freely; replies go straight to the relevant sinks.
pub fn apply(cmd: Command, sender: &str, conn_id: Uuid, directory: &mut Directory) {
    match cmd {
        Command::ToggleTimestamp => {
            if let Some(session) = directory.get_mut(sender) {
                session.show_timestamps = !session.show_timestamps;
                tracing::debug!(
                    name = %sender,
                    show_timestamps = session.show_timestamps,
                    "timestamp display toggled"
                );
            }
        }
        Command::ListUsers => {
            if let Some(session) = directory.get(sender) {
                let mut listing = String::from("Current users:\n");
                for name in directory.names() {
                    listing.push_str("- ");
                    listing.push_str(&name);
                    listing.push('\n');
                }
                let _ = session.sink.send(Frame::Line(listing));
            }
        }
        Command::Whisper { target, text } => match directory.find(&target) {
            Some(recipient) => {
                let _ = recipient
                    .sink
                    .send(Frame::Line(format!("[Whisper] {}> {}\n", sender, text)));
            }
            None => {
                if let Some(session) = directory.get(sender) {
                    let _ = session
                        .sink
                        .send(Frame::Line(format!("# Cannot find user [{}]!\n", target)));
                }
            }
        },
        Command::Help => {
            if let Some(session) = directory.get(sender) {
                let _ = session.sink.send(Frame::Line(HELP_TEXT.to_string()));
            }
        }
        Command::Quit => {
            if let Some(session) = directory.remove(sender, conn_id) {
                tracing::info!(name = %sender, "quit");
                let _ = session.sink.send(Frame::Close);
            }
        }
    }
}
