//! Error types for the stream client.

use thiserror::Error;

/// Errors surfaced by [`crate::client::StreamClient`].
///
/// Only configuration mistakes are returned from `connect()`; transport and
/// credential problems are reported through the connection-state observable
/// so callers can react without a second error channel.
#[derive(Debug, Error)]
pub enum StreamError {
    /// `connect()` was called with an empty endpoint.
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    /// The HTTP request failed before or while streaming.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },
}

/// Convenience result alias.
pub type StreamResult<T> = Result<T, StreamError>;
