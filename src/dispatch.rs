//! The event dispatcher: single consumer of the event queue and exclusive
//! owner of the session directory.
//!
//! Events are applied strictly in arrival order, one at a time. Broadcast
//! fan-out is handed to detached tasks over sink snapshots, so the next
//! event can be consumed immediately and no task ever reads the live
//! directory while it changes.

use chrono::{DateTime, Utc};

use crate::command;
use crate::event::{Event, EventReceiver};
use crate::session::{Directory, Frame, Recipient, Session};

/// Timestamp layout for clients that enabled `/timestamp`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run the dispatch loop until every producer has dropped its sender.
pub async fn run(mut events: EventReceiver) {
    let mut directory = Directory::new();
    while let Some(event) = events.recv().await {
        handle_event(event, &mut directory);
    }
    tracing::debug!("event queue closed, dispatcher stopping");
}

/// Apply one event to the directory and kick off its side effects.
fn handle_event(event: Event, directory: &mut Directory) {
    match event {
        Event::Login {
            name,
            sink,
            conn_id,
            at,
        } => {
            if directory.contains_name(&name) {
                tracing::info!(name = %name, "login rejected, name in use");
                let _ = sink.send(Frame::Line(format!("Name [{}] already in use!\n", name)));
                let _ = sink.send(Frame::Close);
            } else {
                tracing::info!(name = %name, "login admitted");
                directory.insert(Session {
                    name: name.clone(),
                    sink,
                    show_timestamps: false,
                    connected_at: at,
                    conn_id,
                });
            }
        }
        Event::Message {
            sender, body, at, ..
        } => {
            // Snapshot first: sessions admitted after this point receive
            // nothing for this event, and the detached task never touches
            // the live directory.
            let recipients = directory.delivery_snapshot();
            tokio::spawn(deliver(recipients, sender, body, at));
        }
        Event::Command {
            sender,
            line,
            conn_id,
            ..
        } => {
            if let Some(cmd) = command::parse(&line) {
                command::apply(cmd, &sender, conn_id, directory);
            } else {
                tracing::debug!(sender = %sender, "unrecognized command ignored");
            }
        }
        Event::Logout {
            sender, conn_id, ..
        } => {
            if directory.remove(&sender, conn_id).is_some() {
                tracing::info!(name = %sender, "logged out");
            }
        }
    }
}

/// Fan out one composed message to a snapshot of recipients. Each sink
/// receives exactly one whole line; the per-recipient timestamp prefix
/// uses the event's arrival time, not the delivery time.
async fn deliver(recipients: Vec<Recipient>, sender: String, body: String, at: DateTime<Utc>) {
    let stamp = at.format(TIMESTAMP_FORMAT).to_string();
    for recipient in recipients {
        let mut line = String::new();
        if recipient.show_timestamps {
            line.push('[');
            line.push_str(&stamp);
            line.push_str("] ");
        }
        line.push_str(&sender);
        line.push_str("> ");
        line.push_str(&body);
        line.push('\n');
        let _ = recipient.sink.send(Frame::Line(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutboundSender;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn sink() -> (OutboundSender, mpsc::UnboundedReceiver<Frame>) {
        mpsc::unbounded_channel()
    }

    fn login(name: &str, sink: OutboundSender) -> (Event, Uuid) {
        let conn_id = Uuid::new_v4();
        (
            Event::Login {
                name: name.to_string(),
                sink,
                conn_id,
                at: Utc::now(),
            },
            conn_id,
        )
    }

    async fn recv_line(rx: &mut mpsc::UnboundedReceiver<Frame>) -> String {
        match tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("sink closed")
        {
            Frame::Line(line) => line,
            Frame::Close => panic!("expected a line, got a close"),
        }
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected_case_insensitively() {
        let mut dir = Directory::new();
        let (alice_tx, _alice_rx) = sink();
        let (event, _) = login("Alice", alice_tx);
        handle_event(event, &mut dir);

        let (dup_tx, mut dup_rx) = sink();
        let (event, _) = login("ALICE", dup_tx);
        handle_event(event, &mut dir);

        assert_eq!(dir.len(), 1);
        assert_eq!(
            dup_rx.recv().await.unwrap(),
            Frame::Line("Name [ALICE] already in use!\n".to_string())
        );
        assert_eq!(dup_rx.recv().await.unwrap(), Frame::Close);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_current_session_once() {
        let mut dir = Directory::new();
        let (alice_tx, mut alice_rx) = sink();
        let (event, alice_id) = login("Alice", alice_tx);
        handle_event(event, &mut dir);
        let (bob_tx, mut bob_rx) = sink();
        let (event, _) = login("Bob", bob_tx);
        handle_event(event, &mut dir);

        handle_event(
            Event::Message {
                sender: "Alice".to_string(),
                body: "hello".to_string(),
                conn_id: alice_id,
                at: Utc::now(),
            },
            &mut dir,
        );

        assert_eq!(recv_line(&mut alice_rx).await, "Alice> hello\n");
        assert_eq!(recv_line(&mut bob_rx).await, "Alice> hello\n");
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn session_admitted_after_dispatch_misses_the_message() {
        let mut dir = Directory::new();
        let (alice_tx, mut alice_rx) = sink();
        let (event, alice_id) = login("Alice", alice_tx);
        handle_event(event, &mut dir);

        // The snapshot is taken synchronously inside handle_event, so a
        // login right after it cannot join this broadcast.
        handle_event(
            Event::Message {
                sender: "Alice".to_string(),
                body: "early".to_string(),
                conn_id: alice_id,
                at: Utc::now(),
            },
            &mut dir,
        );
        let (bob_tx, mut bob_rx) = sink();
        let (event, _) = login("Bob", bob_tx);
        handle_event(event, &mut dir);

        assert_eq!(recv_line(&mut alice_rx).await, "Alice> early\n");
        tokio::task::yield_now().await;
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn timestamp_preference_prefixes_the_composed_line() {
        let mut dir = Directory::new();
        let (alice_tx, mut alice_rx) = sink();
        let (event, alice_id) = login("Alice", alice_tx);
        handle_event(event, &mut dir);

        handle_event(
            Event::Command {
                sender: "Alice".to_string(),
                line: "/timestamp".to_string(),
                conn_id: alice_id,
                at: Utc::now(),
            },
            &mut dir,
        );
        handle_event(
            Event::Message {
                sender: "Alice".to_string(),
                body: "hi".to_string(),
                conn_id: alice_id,
                at: Utc::now(),
            },
            &mut dir,
        );

        let line = recv_line(&mut alice_rx).await;
        assert!(line.starts_with('['), "missing timestamp prefix: {:?}", line);
        assert!(line.ends_with("] Alice> hi\n"), "bad line: {:?}", line);
        // "[YYYY-MM-DD HH:MM:SS] " is 22 chars.
        assert_eq!(line.len(), 22 + "Alice> hi\n".len());
    }

    #[tokio::test]
    async fn logout_frees_the_name_for_reuse() {
        let mut dir = Directory::new();
        let (alice_tx, _alice_rx) = sink();
        let (event, alice_id) = login("Alice", alice_tx);
        handle_event(event, &mut dir);

        handle_event(
            Event::Logout {
                sender: "Alice".to_string(),
                conn_id: alice_id,
                at: Utc::now(),
            },
            &mut dir,
        );
        assert!(dir.is_empty());

        let (again_tx, _again_rx) = sink();
        let (event, _) = login("alice", again_tx);
        handle_event(event, &mut dir);
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn logout_from_a_rejected_duplicate_does_not_evict() {
        let mut dir = Directory::new();
        let (alice_tx, _alice_rx) = sink();
        let (event, _) = login("Alice", alice_tx);
        handle_event(event, &mut dir);

        let (dup_tx, _dup_rx) = sink();
        let (event, dup_id) = login("alice", dup_tx);
        handle_event(event, &mut dir);

        // The rejected connection's actor still emits a logout on close.
        handle_event(
            Event::Logout {
                sender: "alice".to_string(),
                conn_id: dup_id,
                at: Utc::now(),
            },
            &mut dir,
        );
        assert_eq!(dir.len(), 1);
        assert!(dir.get("Alice").is_some());
    }
}
