//! Room membership for the relay.
//!
//! A room is a named broadcast group of connections. Channel rooms are
//! joined explicitly by clients; each connection is also placed in the user
//! room of its own identity so it can be addressed directly.
//!
//! Rooms exist implicitly: the first join creates one and the last leave
//! removes it.

use crate::connection::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Identifier of a broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Room for a chat channel.
    Channel(String),
    /// Direct-delivery room for one user identity.
    User(String),
}

impl RoomId {
    #[must_use]
    pub fn channel(id: impl Into<String>) -> Self {
        Self::Channel(id.into())
    }

    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{}", id),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Tracks which connections belong to which rooms.
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Members of each non-empty room.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Rooms each connection belongs to.
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room.
    ///
    /// Returns `false` if it was already a member.
    pub fn join(&mut self, connection_id: &ConnectionId, room: RoomId) -> bool {
        let joined = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id.clone());

        if joined {
            debug!(room = %room, connection = %connection_id, "Joined room");
            self.memberships
                .entry(connection_id.clone())
                .or_default()
                .insert(room);
        }

        joined
    }

    /// Remove a connection from a room.
    ///
    /// Returns `false` if it was not a member.
    pub fn leave(&mut self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        let left = self.remove_member(connection_id, room);

        if left {
            if let Some(rooms) = self.memberships.get_mut(connection_id) {
                rooms.remove(room);
                if rooms.is_empty() {
                    self.memberships.remove(connection_id);
                }
            }
            debug!(room = %room, connection = %connection_id, "Left room");
        }

        left
    }

    /// Remove a connection from every room it belongs to.
    ///
    /// Returns the number of rooms left.
    pub fn leave_all(&mut self, connection_id: &ConnectionId) -> usize {
        let rooms = self.memberships.remove(connection_id).unwrap_or_default();
        for room in &rooms {
            self.remove_member(connection_id, room);
        }

        debug!(connection = %connection_id, rooms = rooms.len(), "Left all rooms");
        rooms.len()
    }

    fn remove_member(&mut self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(connection_id);
        if members.is_empty() {
            self.rooms.remove(room);
            debug!(room = %room, "Removed empty room");
        }
        removed
    }

    /// Get the current members of a room. Unknown rooms have no members.
    #[must_use]
    pub fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Iterate over the members of a room without copying.
    pub fn iter_members<'a>(&'a self, room: &RoomId) -> impl Iterator<Item = &'a ConnectionId> {
        self.rooms.get(room).into_iter().flatten()
    }

    #[must_use]
    pub fn is_member(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Get the rooms a connection belongs to.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total number of (connection, room) memberships.
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.memberships.values().map(HashSet::len).sum()
    }
}
