//! Connection registry for the relay.
//!
//! Tracks which user identities are online, the connection currently on
//! record for each, and their presence status. One entry per identity: a
//! second connection from the same user replaces the first.
//!
//! The registry is passive; announcing changes is the caller's job.

use crate::connection::ConnectionId;
use firechat_protocol::ReportedStatus;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Identity is not registered.
    #[error("User not registered: {0}")]
    NotFound(String),
}

/// Stored presence status. Absence from the registry means offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceStatus {
    Online,
    Away,
}

impl From<ReportedStatus> for PresenceStatus {
    /// `offline` is coerced to `online`: leaving the registry only happens
    /// through disconnect.
    fn from(status: ReportedStatus) -> Self {
        match status {
            ReportedStatus::Away => Self::Away,
            ReportedStatus::Online | ReportedStatus::Offline => Self::Online,
        }
    }
}

/// Registry entry for one online identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Most recent connection for this identity.
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub status: PresenceStatus,
}

/// Process-wide map of online identities.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Entries keyed by user identity.
    entries: HashMap<String, RegistryEntry>,
    /// Connection on record -> user identity.
    by_connection: HashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an identity with status `online`.
    ///
    /// Returns the entry this registration superseded, if any.
    pub fn register(
        &mut self,
        user_id: impl Into<String>,
        connection_id: ConnectionId,
    ) -> Option<RegistryEntry> {
        let user_id = user_id.into();
        self.by_connection
            .insert(connection_id.clone(), user_id.clone());

        let previous = self.entries.insert(
            user_id.clone(),
            RegistryEntry {
                connection_id: connection_id.clone(),
                user_id: user_id.clone(),
                status: PresenceStatus::Online,
            },
        );

        match &previous {
            Some(old) if old.connection_id != connection_id => {
                self.by_connection.remove(&old.connection_id);
                debug!(user = %user_id, superseded = %old.connection_id, "Registry: connection replaced");
            }
            Some(_) => {}
            None => debug!(user = %user_id, "Registry: user registered"),
        }

        previous
    }

    /// Remove the entry whose connection on record is `connection_id`.
    ///
    /// A connection that was already superseded removes nothing.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<RegistryEntry> {
        let user_id = self.by_connection.remove(connection_id)?;
        let entry = self.entries.remove(&user_id);
        if entry.is_some() {
            debug!(user = %user_id, connection = %connection_id, "Registry: user unregistered");
        }
        entry
    }

    /// Update the status of a registered identity.
    ///
    /// Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the identity is not registered.
    pub fn set_status(
        &mut self,
        user_id: &str,
        status: ReportedStatus,
    ) -> Result<PresenceStatus, RegistryError> {
        let entry = self
            .entries
            .get_mut(user_id)
            .ok_or_else(|| RegistryError::NotFound(user_id.to_string()))?;

        let previous = entry.status;
        entry.status = status.into();
        Ok(previous)
    }

    /// Get all registered identities.
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Get the stored status of an identity.
    #[must_use]
    pub fn status(&self, user_id: &str) -> Option<PresenceStatus> {
        self.entries.get(user_id).map(|e| e.status)
    }

    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Number of online identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
