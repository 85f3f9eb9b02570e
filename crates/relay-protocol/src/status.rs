//! Presence status values as they appear on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A status reported by a client in a `status-update` event.
///
/// `Offline` is accepted on the wire but is never stored by the relay:
/// a user only goes offline by disconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Online,
    Away,
    Offline,
}

impl ReportedStatus {
    /// Get the wire name of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
