//! Single-task relay actor.
//!
//! The [`Relay`] lives on one tokio task and is driven by commands from a
//! mailbox, so every mutation is serialized without locks. Transport tasks
//! talk to it through a cloneable [`RelayHandle`].

use crate::connection::{ConnectionId, Outbox};
use crate::relay::{Relay, RelayError, RelayStats};
use firechat_protocol::InboundEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request for the relay task.
#[derive(Debug)]
pub enum Command {
    Connect {
        connection_id: ConnectionId,
        user_id: String,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), RelayError>>,
    },
    Event {
        connection_id: ConnectionId,
        event: InboundEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

/// Cloneable front door to the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    mailbox: mpsc::UnboundedSender<Command>,
}

impl RelayHandle {
    /// Spawn a relay task and return its handle.
    ///
    /// The task exits once every handle has been dropped.
    #[must_use]
    pub fn spawn(relay: Relay) -> (Self, JoinHandle<Relay>) {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(relay, inbox));
        (Self { mailbox }, task)
    }

    /// Open a connection on the relay.
    ///
    /// # Errors
    ///
    /// Returns the relay's rejection, or [`RelayError::Stopped`] if the task is gone.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        user_id: impl Into<String>,
        outbox: Outbox,
    ) -> Result<(), RelayError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Connect {
            connection_id,
            user_id: user_id.into(),
            outbox,
            reply,
        })?;
        response.await.map_err(|_| RelayError::Stopped)?
    }

    /// Queue an inbound event. Events from one handle are applied in order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Stopped`] if the task is gone.
    pub fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<(), RelayError> {
        self.send(Command::Event {
            connection_id,
            event,
        })
    }

    /// Queue a disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Stopped`] if the task is gone.
    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RelayError> {
        self.send(Command::Disconnect { connection_id })
    }

    /// Get relay statistics.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Stopped`] if the task is gone.
    pub async fn stats(&self) -> Result<RelayStats, RelayError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        response.await.map_err(|_| RelayError::Stopped)
    }

    fn send(&self, command: Command) -> Result<(), RelayError> {
        self.mailbox.send(command).map_err(|_| RelayError::Stopped)
    }
}

async fn run(mut relay: Relay, mut inbox: mpsc::UnboundedReceiver<Command>) -> Relay {
    info!("Relay task started");

    while let Some(command) = inbox.recv().await {
        match command {
            Command::Connect {
                connection_id,
                user_id,
                outbox,
                reply,
            } => {
                let result = relay.connect(connection_id, &user_id, outbox);
                // Caller may have given up waiting
                let _ = reply.send(result);
            }
            Command::Event {
                connection_id,
                event,
            } => {
                relay.handle(&connection_id, event);
            }
            Command::Disconnect { connection_id } => {
                relay.disconnect(&connection_id);
            }
            Command::Stats { reply } => {
                let _ = reply.send(relay.stats());
            }
        }
    }

    debug!(stats = ?relay.stats(), "Relay mailbox closed");
    info!("Relay task stopped");
    relay
}
