//! Listener setup and the accept loop wiring connections to the
//! dispatcher.

use std::io;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::dispatch;
use crate::event::{self, EventSender};
use crate::ingest;

/// A running relay: the bound listener plus the spawned dispatcher, with
/// the event sender exposed for additional producers (the shutdown
/// coordinator, tests).
pub struct Relay {
    pub listener: TcpListener,
    pub events: EventSender,
    _dispatcher: tokio::task::JoinHandle<()>,
}

/// Bind the listener and start the dispatcher. Bind failure is fatal to
/// the caller; nothing is retried.
pub async fn start(config: &Config) -> io::Result<Relay> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    let (events, queue) = event::event_queue(config.event_queue_capacity);
    let dispatcher = tokio::spawn(dispatch::run(queue));
    tracing::info!(addr = %listener.local_addr()?, "relay listening");
    Ok(Relay {
        listener,
        events,
        _dispatcher: dispatcher,
    })
}

impl Relay {
    /// Accept connections forever, one ingestion actor per connection.
    /// Returns only on accept failure, which is fatal to the process.
    pub async fn accept_loop(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tracing::debug!(peer = %peer, "accepted connection");
            tokio::spawn(ingest::run_connection(stream, self.events.clone()));
        }
    }
}
