//! Connection state as observed by the rest of the application.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the one persistent connection.
///
/// Mutated only by the connection supervisor; everything else reads it
/// through the state observable. This is the sole channel by which the
/// application learns about degraded connectivity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and no pending retry. Terminal until `connect()`.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
    /// The last attempt failed; a retry may be pending.
    Error,
}

impl ConnectionState {
    /// Stable label for logs and diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn serde_snake_case() {
        let v = serde_json::to_value(ConnectionState::Connecting).unwrap();
        assert_eq!(v, "connecting");
        let back: ConnectionState = serde_json::from_value(v).unwrap();
        assert_eq!(back, ConnectionState::Connecting);
    }

    #[test]
    fn labels_match_serde() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
        ] {
            let v = serde_json::to_value(state).unwrap();
            assert_eq!(v.as_str().unwrap(), state.as_str());
        }
    }
}
