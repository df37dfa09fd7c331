//! Connection configuration.

use std::time::Duration;

/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Default number of consecutive automatic reconnect attempts before the
/// supervisor gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Configuration for one persistent connection.
///
/// Immutable for the lifetime of a connection attempt; changing anything
/// means tearing the connection down and calling `connect()` again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Event-stream endpoint URL.
    pub endpoint: String,
    /// Rooms/topics this connection subscribes to server-side (e.g.
    /// `"quiz:42"`). Empty means the server default scope.
    pub rooms: Vec<String>,
    /// Event types the server should push. Empty means all.
    pub allowed_types: Vec<String>,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Reconnection budget: attempts beyond this settle in `Disconnected`.
    pub max_reconnect_attempts: u32,
}

impl StreamConfig {
    /// Configuration for `endpoint` with default reconnect policy and no
    /// server-side filtering.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            rooms: Vec::new(),
            allowed_types: Vec::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Restrict the connection to the given rooms.
    #[must_use]
    pub fn with_rooms(mut self, rooms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.rooms = rooms.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the connection to the given event types.
    #[must_use]
    pub fn with_allowed_types(
        mut self,
        types: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Override the reconnection budget.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}
