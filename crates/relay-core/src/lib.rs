//! # firechat-relay-core
//!
//! Presence tracking and fan-out for the Firechat realtime relay.
//!
//! This crate provides the building blocks:
//!
//! - **Registry** - Which user identities are online, and their status
//! - **Rooms** - Channel rooms and per-user rooms of connections
//! - **Presence** - Global online/offline/status announcements
//! - **Relay** - Connection lifecycle and event routing
//! - **Actor** - Runs the relay on a single task behind a mailbox
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ RelayHandle │────▶│    Relay    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                   │   │   │
//!        │ outbox     ┌──────────────────────┘   │   └──────────┐
//!        │            ▼                          ▼              ▼
//!        │     ┌─────────────┐          ┌─────────────┐  ┌─────────────┐
//!        └─────│  Sessions   │          │  Registry   │  │    Rooms    │
//!              └─────────────┘          └─────────────┘  └─────────────┘
//! ```

pub mod actor;
pub mod connection;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod rooms;

pub use actor::{Command, RelayHandle};
pub use connection::{outbox, ConnectionId, ConnectionState, Outbox, OutboxReceiver};
pub use presence::{PresenceBroadcaster, PresenceEvent};
pub use registry::{ConnectionRegistry, PresenceStatus, RegistryEntry, RegistryError};
pub use relay::{authenticate, Relay, RelayError, RelayStats};
pub use rooms::{RoomId, RoomMembership};
