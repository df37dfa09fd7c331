//! # quizcast-core
//!
//! Shared vocabulary for the quizcast live-event client:
//!
//! - **Envelopes**: [`envelope::EventEnvelope`], the decoded form of one wire
//!   frame, plus the well-known event-type tags and reserved frame names
//! - **Connection state**: [`state::ConnectionState`] as observed by consumers
//! - **Configuration**: [`config::StreamConfig`] for one connection attempt
//!
//! ## Crate Position
//!
//! Foundation crate. No I/O and no transport dependencies; depended on by
//! `quizcast-stream`.

#![deny(unsafe_code)]

pub mod config;
pub mod envelope;
pub mod state;

pub use config::StreamConfig;
pub use envelope::EventEnvelope;
pub use state::ConnectionState;
