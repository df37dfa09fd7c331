//! # quizcast-stream
//!
//! The live subsystem of the quizcast dashboard: one reconnecting SSE
//! connection per authenticated session, fanned out to any number of
//! independently filtered in-process subscribers.
//!
//! - **[`client::StreamClient`]**: connection supervisor owning the single
//!   transport task, the connection-state machine, and the reconnect timer
//! - **[`bus::EventBus`]** / **[`bus::Subscription`]**: fan-out registry and
//!   per-consumer lease
//! - **[`filter::EventFilter`]**: composable delivery criteria (event type,
//!   room, predicate)
//! - **[`decode`]**: wire frame → [`quizcast_core::EventEnvelope`]
//! - **[`credentials::CredentialProvider`]**: token lookup seam; login and
//!   refresh live elsewhere
//!
//! Delivery is at-most-once and best-effort; per-subscriber ordering matches
//! wire arrival order within one connection's lifetime.

#![deny(unsafe_code)]

pub mod bus;
pub mod client;
pub mod credentials;
pub mod decode;
pub mod error;
pub mod filter;

pub use bus::{EventBus, Subscription};
pub use client::StreamClient;
pub use credentials::{CredentialProvider, StaticToken};
pub use error::StreamError;
pub use filter::EventFilter;
