//! Graceful shutdown coordination.
//!
//! On SIGINT/SIGTERM the coordinator broadcasts a shutdown notice through
//! the normal message path, holds for a grace period while events keep
//! flowing, then releases process exit. Connections are not explicitly
//! closed; process exit terminates them.

use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use uuid::Uuid;

use crate::event::{Event, EventSender};

/// Name the shutdown notice is broadcast under.
const SERVER_NAME: &str = "Server";

/// Coordinator phases. `Draining` means the notice went out and the grace
/// period is running; no new events are rejected during it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Stopped,
}

impl Phase {
    /// The only legal transitions: Running -> Draining -> Stopped.
    pub fn advance(self) -> Phase {
        match self {
            Phase::Running => Phase::Draining,
            Phase::Draining | Phase::Stopped => Phase::Stopped,
        }
    }
}

/// Shutdown coordinator state machine.
pub struct Coordinator {
    phase: Phase,
    grace: Duration,
    events: EventSender,
}

impl Coordinator {
    pub fn new(events: EventSender, grace: Duration) -> Self {
        Self {
            phase: Phase::Running,
            grace,
            events,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Block until a termination signal arrives, then drain. Returning
    /// releases process exit.
    pub async fn run(mut self) {
        wait_for_signal().await;
        self.drain().await;
    }

    /// Advance through Draining to Stopped: broadcast the notice, hold
    /// for the grace period. Split from `run` so the sequence can be
    /// exercised without delivering a real signal.
    pub async fn drain(&mut self) {
        self.phase = self.phase.advance();
        tracing::info!(
            grace_secs = self.grace.as_secs(),
            "termination signal received, draining"
        );

        let notice = format!("Server going down in {} seconds!", self.grace.as_secs());
        let _ = self
            .events
            .send(Event::Message {
                sender: SERVER_NAME.to_string(),
                body: notice,
                conn_id: Uuid::new_v4(),
                at: Utc::now(),
            })
            .await;

        tokio::time::sleep(self.grace).await;

        self.phase = self.phase.advance();
        tracing::info!("grace period over, stopping");
    }
}

/// Wait for SIGINT (Ctrl-C) or, on unix, SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    #[test]
    fn phases_advance_in_one_direction() {
        assert_eq!(Phase::Running.advance(), Phase::Draining);
        assert_eq!(Phase::Draining.advance(), Phase::Stopped);
        assert_eq!(Phase::Stopped.advance(), Phase::Stopped);
    }

    #[tokio::test]
    async fn drain_broadcasts_one_notice_then_stops() {
        let (tx, mut rx) = event::event_queue(8);
        let mut coordinator = Coordinator::new(tx, Duration::from_millis(10));
        assert_eq!(coordinator.phase(), Phase::Running);

        coordinator.drain().await;
        assert_eq!(coordinator.phase(), Phase::Stopped);

        match rx.try_recv().expect("expected the shutdown notice") {
            Event::Message { sender, body, .. } => {
                assert_eq!(sender, "Server");
                assert_eq!(body, "Server going down in 0 seconds!");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
