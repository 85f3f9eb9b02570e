//! Presence announcements.
//!
//! Presence is global: every online, offline and status change goes to all
//! active connections. A connection that just became active also gets the
//! set of identities already online, addressed to it alone.

use crate::connection::{ConnectionId, SessionTable};
use crate::registry::ConnectionRegistry;
use crate::relay::encode_frame;
use firechat_protocol::{OutboundEvent, ReportedStatus};
use tracing::trace;

/// A presence change to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Online,
    Offline,
    Status(ReportedStatus),
}

impl PresenceEvent {
    fn into_outbound(self, user_id: &str) -> OutboundEvent {
        match self {
            Self::Online => OutboundEvent::user_online(user_id),
            Self::Offline => OutboundEvent::user_offline(user_id),
            Self::Status(status) => OutboundEvent::user_status_changed(user_id, status),
        }
    }
}

/// Decides who hears about presence changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Broadcast a presence change for `user_id` to every active connection.
    ///
    /// Returns the number of recipients.
    pub fn announce(&self, sessions: &SessionTable, user_id: &str, event: PresenceEvent) -> usize {
        let Some(frame) = encode_frame(&event.into_outbound(user_id)) else {
            return 0;
        };
        let count = sessions.broadcast(&frame);
        trace!(user = %user_id, event = ?event, recipients = count, "Announced presence");
        count
    }

    /// Send the online set to a single connection.
    ///
    /// The receiving connection's own identity is left out of the set.
    pub fn send_snapshot(
        &self,
        sessions: &SessionTable,
        registry: &ConnectionRegistry,
        to: &ConnectionId,
    ) -> bool {
        let own = sessions.get(to).map(|s| s.user_id());
        let online: Vec<String> = registry
            .snapshot()
            .into_iter()
            .filter(|user| Some(user.as_str()) != own)
            .collect();

        encode_frame(&OutboundEvent::OnlineUsersSnapshot(online))
            .is_some_and(|frame| sessions.send_to(to, &frame))
    }
}
