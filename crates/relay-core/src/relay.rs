//! The event relay.
//!
//! The relay owns the session table, the connection registry and room
//! membership, and is the only writer of all three. It drives each
//! connection through its lifecycle and routes inbound events to the rooms
//! they address. Payloads are forwarded as received.

use crate::connection::{ConnectionId, ConnectionState, Outbox, Session, SessionTable};
use crate::presence::{PresenceBroadcaster, PresenceEvent};
use crate::registry::ConnectionRegistry;
use crate::rooms::{RoomId, RoomMembership};
use bytes::Bytes;
use firechat_protocol::{codec, InboundEvent, OutboundEvent};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Relay errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Handshake did not carry a user identity.
    #[error("Connection rejected: missing user identity")]
    MissingIdentity,

    /// A session with this connection ID already exists.
    #[error("Connection already open: {0}")]
    DuplicateConnection(ConnectionId),

    /// The relay task is no longer running.
    #[error("Relay stopped")]
    Stopped,
}

/// Validate the identity presented at handshake.
///
/// # Errors
///
/// Returns [`RelayError::MissingIdentity`] if no identity or an empty one was supplied.
pub fn authenticate(identity: Option<&str>) -> Result<String, RelayError> {
    identity
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(RelayError::MissingIdentity)
}

/// Relay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Number of active connections.
    pub connections: usize,
    /// Number of identities in the registry.
    pub users_online: usize,
    /// Number of non-empty rooms.
    pub rooms: usize,
    /// Total room memberships.
    pub memberships: usize,
}

pub(crate) fn encode_frame(event: &OutboundEvent) -> Option<Bytes> {
    match codec::encode(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound event");
            None
        }
    }
}

/// The relay state machine and router.
#[derive(Debug, Default)]
pub struct Relay {
    sessions: SessionTable,
    registry: ConnectionRegistry,
    rooms: RoomMembership,
    presence: PresenceBroadcaster,
}

impl Relay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `identity` and make it active.
    ///
    /// The connection is registered, placed in its user room, announced
    /// online to everyone, and sent the identities already online.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is empty or the connection ID is
    /// already in use. No state changes in either case.
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        identity: &str,
        outbox: Outbox,
    ) -> Result<(), RelayError> {
        if self.sessions.get(&connection_id).is_some() {
            return Err(RelayError::DuplicateConnection(connection_id));
        }

        let mut session = Session::new(identity, outbox);
        let user_id = match authenticate(Some(identity)) {
            Ok(user_id) => user_id,
            Err(e) => {
                session.advance(ConnectionState::Closed);
                warn!(connection = %connection_id, "Handshake rejected: missing identity");
                return Err(e);
            }
        };
        session.advance(ConnectionState::Authenticated);
        session.advance(ConnectionState::Active);
        self.sessions.insert(connection_id.clone(), session);

        if let Some(old) = self.registry.register(user_id.clone(), connection_id.clone()) {
            debug!(user = %user_id, superseded = %old.connection_id, "New connection supersedes previous");
        }
        self.rooms.join(&connection_id, RoomId::user(user_id.clone()));

        self.presence
            .announce(&self.sessions, &user_id, PresenceEvent::Online);
        self.presence
            .send_snapshot(&self.sessions, &self.registry, &connection_id);

        info!(connection = %connection_id, user = %user_id, "Connection active");
        Ok(())
    }

    /// Close a connection.
    ///
    /// Leaves every room, unregisters, and announces the user offline if this
    /// connection was still the one on record. Returns `false` for unknown
    /// connections.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> bool {
        let Some(mut session) = self.sessions.remove(connection_id) else {
            debug!(connection = %connection_id, "Disconnect for unknown connection");
            return false;
        };
        session.advance(ConnectionState::Closed);

        self.rooms.leave_all(connection_id);

        match self.registry.unregister(connection_id) {
            Some(entry) => {
                self.presence
                    .announce(&self.sessions, &entry.user_id, PresenceEvent::Offline);
            }
            None => {
                debug!(
                    connection = %connection_id,
                    user = %session.user_id(),
                    "Superseded connection closed, user stays online"
                );
            }
        }

        info!(connection = %connection_id, user = %session.user_id(), "Connection closed");
        true
    }

    /// Handle an event from a connection.
    ///
    /// Events from connections that are not active are ignored. Returns the
    /// number of connections the event was delivered to.
    pub fn handle(&mut self, connection_id: &ConnectionId, event: InboundEvent) -> usize {
        let Some(user_id) = self
            .sessions
            .active(connection_id)
            .map(|s| s.user_id().to_string())
        else {
            trace!(connection = %connection_id, event = event.name(), "Ignoring event from inactive connection");
            return 0;
        };

        match event {
            InboundEvent::JoinChannel { channel_id } => {
                self.rooms.join(connection_id, RoomId::Channel(channel_id));
                0
            }

            InboundEvent::LeaveChannel { channel_id } => {
                self.rooms
                    .leave(connection_id, &RoomId::Channel(channel_id));
                0
            }

            InboundEvent::ChannelMessage {
                channel_id,
                message,
            } => self.fan_out(
                &RoomId::Channel(channel_id),
                None,
                &OutboundEvent::ChannelMessage(message),
            ),

            InboundEvent::DirectMessage {
                receiver_id,
                message,
            } => {
                let Some(frame) = encode_frame(&OutboundEvent::DirectMessage(message)) else {
                    return 0;
                };
                let receiver = RoomId::User(receiver_id);
                let sender = RoomId::User(user_id);
                let targets: HashSet<&ConnectionId> = self
                    .rooms
                    .iter_members(&receiver)
                    .chain(self.rooms.iter_members(&sender))
                    .collect();

                let count = self.sessions.deliver(targets, &frame);
                trace!(room = %receiver, recipients = count, "Direct message delivered");
                count
            }

            InboundEvent::Typing {
                channel_id,
                active,
                data,
            } => self.fan_out(
                &RoomId::Channel(channel_id),
                Some(connection_id),
                &OutboundEvent::typing(active, data),
            ),

            InboundEvent::DmTyping {
                receiver_id,
                active,
                data,
            } => self.fan_out(
                &RoomId::User(receiver_id),
                None,
                &OutboundEvent::dm_typing(active, data),
            ),

            InboundEvent::StatusUpdate { status } => {
                match self.registry.set_status(&user_id, status) {
                    Ok(previous) => {
                        debug!(user = %user_id, ?previous, %status, "Status updated");
                        self.presence.announce(
                            &self.sessions,
                            &user_id,
                            PresenceEvent::Status(status),
                        )
                    }
                    Err(e) => {
                        debug!(connection = %connection_id, error = %e, "Ignoring status update");
                        0
                    }
                }
            }
        }
    }

    /// Deliver an event to every member of a room, optionally skipping one.
    fn fan_out(
        &self,
        room: &RoomId,
        exclude: Option<&ConnectionId>,
        event: &OutboundEvent,
    ) -> usize {
        let Some(frame) = encode_frame(event) else {
            return 0;
        };
        let targets = self
            .rooms
            .iter_members(room)
            .filter(|member| Some(*member) != exclude);

        let count = self.sessions.deliver(targets, &frame);
        trace!(room = %room, recipients = count, "Fanned out");
        count
    }

    /// Get relay statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.sessions.len(),
            users_online: self.registry.len(),
            rooms: self.rooms.room_count(),
            memberships: self.rooms.membership_count(),
        }
    }

    /// Lifecycle state of a connection. Closed connections are forgotten.
    #[must_use]
    pub fn state_of(&self, connection_id: &ConnectionId) -> Option<ConnectionState> {
        self.sessions.get(connection_id).map(Session::state)
    }

    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }
}
