//! Event types for the Firechat relay protocol.
//!
//! Every frame on the wire is a JSON text frame shaped as an envelope:
//!
//! ```json
//! {"event": "send-channel-message", "data": {"channelId": "general", "message": {...}}}
//! ```
//!
//! Message bodies and typing payloads are kept as [`RawValue`] so they are
//! forwarded exactly as the client sent them.

use crate::status::ReportedStatus;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// An opaque JSON payload, relayed byte-for-byte.
pub type Payload = Box<RawValue>;

/// Inbound event names.
pub mod names {
    pub const JOIN_CHANNEL: &str = "join-channel";
    pub const LEAVE_CHANNEL: &str = "leave-channel";
    pub const SEND_CHANNEL_MESSAGE: &str = "send-channel-message";
    pub const SEND_DIRECT_MESSAGE: &str = "send-direct-message";
    pub const TYPING_START: &str = "typing-start";
    pub const TYPING_STOP: &str = "typing-stop";
    pub const DM_TYPING_START: &str = "dm-typing-start";
    pub const DM_TYPING_STOP: &str = "dm-typing-stop";
    pub const STATUS_UPDATE: &str = "status-update";
}

/// An event received from a client connection.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Subscribe to a channel room.
    JoinChannel { channel_id: String },

    /// Unsubscribe from a channel room.
    LeaveChannel { channel_id: String },

    /// Message for every member of a channel room.
    ChannelMessage {
        channel_id: String,
        message: Payload,
    },

    /// Message for one user, echoed to the sender's own user room.
    DirectMessage {
        receiver_id: String,
        message: Payload,
    },

    /// Typing indicator in a channel. `data` is the whole client payload.
    Typing {
        channel_id: String,
        active: bool,
        data: Payload,
    },

    /// Typing indicator in a direct conversation.
    DmTyping {
        receiver_id: String,
        active: bool,
        data: Payload,
    },

    /// Self-reported presence change.
    StatusUpdate { status: ReportedStatus },
}

impl InboundEvent {
    /// Get the wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChannel { .. } => names::JOIN_CHANNEL,
            Self::LeaveChannel { .. } => names::LEAVE_CHANNEL,
            Self::ChannelMessage { .. } => names::SEND_CHANNEL_MESSAGE,
            Self::DirectMessage { .. } => names::SEND_DIRECT_MESSAGE,
            Self::Typing { active: true, .. } => names::TYPING_START,
            Self::Typing { active: false, .. } => names::TYPING_STOP,
            Self::DmTyping { active: true, .. } => names::DM_TYPING_START,
            Self::DmTyping { active: false, .. } => names::DM_TYPING_STOP,
            Self::StatusUpdate { .. } => names::STATUS_UPDATE,
        }
    }
}

/// Presence notice carried by `user-online` and `user-status-changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub user_id: String,
    pub status: ReportedStatus,
}

/// Identity carried by `user-offline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: String,
}

/// An event sent by the relay to client connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Identities already online, sent once to a newly active connection.
    OnlineUsersSnapshot(Vec<String>),
    UserOnline(PresenceNotice),
    UserOffline(UserRef),
    UserStatusChanged(PresenceNotice),
    ChannelMessage(Payload),
    DirectMessage(Payload),
    TypingStart(Payload),
    TypingStop(Payload),
    DmTypingStart(Payload),
    DmTypingStop(Payload),
}

impl OutboundEvent {
    /// Create a `user-online` event.
    #[must_use]
    pub fn user_online(user_id: impl Into<String>) -> Self {
        Self::UserOnline(PresenceNotice {
            user_id: user_id.into(),
            status: ReportedStatus::Online,
        })
    }

    /// Create a `user-offline` event.
    #[must_use]
    pub fn user_offline(user_id: impl Into<String>) -> Self {
        Self::UserOffline(UserRef {
            user_id: user_id.into(),
        })
    }

    /// Create a `user-status-changed` event.
    #[must_use]
    pub fn user_status_changed(user_id: impl Into<String>, status: ReportedStatus) -> Self {
        Self::UserStatusChanged(PresenceNotice {
            user_id: user_id.into(),
            status,
        })
    }

    /// Create a channel typing event.
    #[must_use]
    pub fn typing(active: bool, data: Payload) -> Self {
        if active {
            Self::TypingStart(data)
        } else {
            Self::TypingStop(data)
        }
    }

    /// Create a direct-message typing event.
    #[must_use]
    pub fn dm_typing(active: bool, data: Payload) -> Self {
        if active {
            Self::DmTypingStart(data)
        } else {
            Self::DmTypingStop(data)
        }
    }
}
