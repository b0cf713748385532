//! Per-connection ingestion actor.
//!
//! Runs the actor-per-connection pattern for an accepted TCP stream:
//! - Writer task: owns the write half, drains an mpsc channel of frames.
//! - Reader loop: prompts for a name, then turns input lines into typed
//!   events for the dispatcher.
//!
//! The mpsc sender is the session's sink; the dispatcher holds a clone
//! after login, so it can push composed lines or force a close. The actor
//! itself never touches the directory, and read errors are terminal for
//! this connection only.

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::{Event, EventSender};
use crate::session::Frame;

/// Lines shorter than this after trimming are treated as noise (bare
/// newlines, stray single characters) and dropped without an event.
const MIN_LINE_LEN: usize = 2;

/// Sent before the first read; no trailing newline.
const NAME_PROMPT: &str = "What is your name? ";

/// Run the actor for one accepted connection until it goes away.
pub async fn run_connection(stream: TcpStream, events: EventSender) {
    let peer = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<Frame>();
    let conn_id = Uuid::new_v4();

    let writer = tokio::spawn(writer_task(write_half, rx));
    let mut reader = BufReader::new(read_half);

    // Name negotiation: the first line, trimmed, becomes the display name.
    let _ = tx.send(Frame::Line(NAME_PROMPT.to_string()));
    let mut line = String::new();
    let name = match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => {
            // Client went away before naming itself; nothing was admitted.
            tracing::debug!(peer = ?peer, "connection closed before login");
            let _ = tx.send(Frame::Close);
            let _ = writer.await;
            return;
        }
        Ok(_) => line.trim().to_string(),
    };

    tracing::info!(peer = ?peer, name = %name, conn_id = %conn_id, "connection named");

    let admitted = events
        .send(Event::Login {
            name: name.clone(),
            sink: tx.clone(),
            conn_id,
            at: Utc::now(),
        })
        .await;
    if admitted.is_err() {
        // Dispatcher is gone; nothing left to talk to.
        let _ = tx.send(Frame::Close);
        let _ = writer.await;
        return;
    }

    // Read loop: one event per sufficiently long line. Stops on EOF, read
    // error, or when the dispatcher drops the outbound channel (duplicate
    // rejection, /quit).
    loop {
        line.clear();
        let read = tokio::select! {
            r = reader.read_line(&mut line) => r,
            _ = tx.closed() => break,
        };
        match read {
            Ok(0) => break,
            Err(e) => {
                tracing::warn!(peer = ?peer, name = %name, error = %e, "read failed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.len() < MIN_LINE_LEN {
                    continue;
                }
                let event = if trimmed.starts_with('/') {
                    Event::Command {
                        sender: name.clone(),
                        line: trimmed.to_string(),
                        conn_id,
                        at: Utc::now(),
                    }
                } else {
                    Event::Message {
                        sender: name.clone(),
                        body: trimmed.to_string(),
                        conn_id,
                        at: Utc::now(),
                    }
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = events
        .send(Event::Logout {
            sender: name.clone(),
            conn_id,
            at: Utc::now(),
        })
        .await;
    let _ = tx.send(Frame::Close);
    drop(tx);
    let _ = writer.await;
    tracing::info!(peer = ?peer, name = %name, "connection closed");
}

/// Writer task: drains the outbound channel into the socket. A `Close`
/// frame or a failed write shuts the stream down and stops the task,
/// which also closes the channel and wakes the reader loop.
async fn writer_task(write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Frame>) {
    let mut writer = BufWriter::new(write_half);
    while let Some(frame) = rx.recv().await {
        match frame {
            Frame::Line(text) => {
                if writer.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            Frame::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}
