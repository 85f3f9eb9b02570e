//! # firechat-protocol
//!
//! Wire contract for the Firechat realtime relay.
//!
//! Clients and the relay exchange JSON text frames shaped as
//! `{"event": <name>, "data": <value>}`. Message bodies are opaque to the
//! relay and are forwarded without re-serialization.
//!
//! ## Inbound events
//!
//! - `join-channel` / `leave-channel` - Channel room membership
//! - `send-channel-message` / `send-direct-message` - Content fan-out
//! - `typing-start` / `typing-stop` / `dm-typing-start` / `dm-typing-stop` - Typing indicators
//! - `status-update` - Self-reported presence
//!
//! ## Example
//!
//! ```rust
//! use firechat_protocol::{codec, InboundEvent, OutboundEvent};
//!
//! let event = codec::decode(r#"{"event":"join-channel","data":"general"}"#).unwrap();
//! assert!(matches!(event, InboundEvent::JoinChannel { .. }));
//!
//! let frame = codec::encode(&OutboundEvent::user_offline("alice")).unwrap();
//! assert_eq!(&frame[..], br#"{"event":"user-offline","data":{"userId":"alice"}}"#);
//! ```

pub mod codec;
pub mod events;
pub mod status;

pub use codec::{decode, decode_bytes, encode, ProtocolError};
pub use events::{InboundEvent, OutboundEvent, Payload, PresenceNotice, UserRef};
pub use status::ReportedStatus;
