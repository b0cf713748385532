//! Typed events flowing from ingestion actors into the dispatcher.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::session::OutboundSender;

/// One unit of work produced by a connection.
///
/// Immutable once constructed; ownership moves through the event queue
/// from the producing actor to the dispatcher. Every variant carries the
/// originating connection's id so membership changes can be attributed to
/// the connection that is actually entitled to them.
#[derive(Debug)]
pub enum Event {
    /// A connection submitted a display name and wants to join.
    Login {
        name: String,
        sink: OutboundSender,
        conn_id: Uuid,
        at: DateTime<Utc>,
    },
    /// A plain chat line to broadcast to everyone.
    Message {
        sender: String,
        body: String,
        conn_id: Uuid,
        at: DateTime<Utc>,
    },
    /// A slash-prefixed line for the command processor.
    Command {
        sender: String,
        line: String,
        conn_id: Uuid,
        at: DateTime<Utc>,
    },
    /// The connection went away (EOF, read error, or forced close).
    Logout {
        sender: String,
        conn_id: Uuid,
        at: DateTime<Utc>,
    },
}

/// Producer half of the bounded event queue. Ingestion actors and the
/// shutdown coordinator clone this; sends await when the queue is full,
/// which is the intended form of backpressure.
pub type EventSender = mpsc::Sender<Event>;

/// Consumer half, held only by the dispatcher.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create the bounded FIFO event queue.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}
