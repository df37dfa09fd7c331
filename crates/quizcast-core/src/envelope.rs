//! Decoded event envelopes and well-known frame names.
//!
//! The wire carries named SSE frames whose body is JSON with a `type`
//! discriminator and an event-specific `data` object. The envelope is the
//! decoded, immutable form handed to subscribers; `data` stays opaque to the
//! core so new server-side event types need no client release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Event type tags
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known event type tags emitted by the quiz server.
///
/// The set is open: the server may add types at any time and subscribers
/// filtering by other tags are unaffected.
pub mod event_types {
    /// A quiz session went live.
    pub const QUIZ_STARTED: &str = "QUIZ_STARTED";
    /// A quiz session closed.
    pub const QUIZ_ENDED: &str = "QUIZ_ENDED";
    /// A participant submitted answers.
    pub const SUBMISSION_RECEIVED: &str = "SUBMISSION_RECEIVED";
    /// Grading finished for a submission.
    pub const GRADING_COMPLETED: &str = "GRADING_COMPLETED";
    /// A participant joined a room.
    pub const PARTICIPANT_JOINED: &str = "PARTICIPANT_JOINED";
    /// A participant left a room.
    pub const PARTICIPANT_LEFT: &str = "PARTICIPANT_LEFT";
}

/// Reserved frame names that never reach subscribers.
pub mod reserved {
    /// Emitted once after the server accepts the connection. Informational.
    pub const CONNECTED: &str = "connected";
    /// Keep-alive through intermediary timeouts. Discarded on arrival.
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Check whether a frame name is reserved for transport bookkeeping.
#[must_use]
pub fn is_reserved_frame(name: &str) -> bool {
    name == reserved::CONNECTED || name == reserved::HEARTBEAT
}

// ─────────────────────────────────────────────────────────────────────────────
// EventEnvelope
// ─────────────────────────────────────────────────────────────────────────────

/// One decoded wire frame.
///
/// Invariant: `event_type` is never empty; the decoder drops frames without
/// a usable type tag before an envelope exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Event type tag (open set, see [`event_types`]).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event-specific payload. Opaque to the client core.
    pub data: Value,
    /// Local arrival timestamp (the wire carries none).
    pub received_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current UTC time.
    #[must_use]
    pub fn now(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            received_at: Utc::now(),
        }
    }

    /// Read a string field out of `data`, if present.
    #[must_use]
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serde_uses_type_tag() {
        let e = EventEnvelope::now(event_types::QUIZ_STARTED, json!({"quizId": "42"}));
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "QUIZ_STARTED");
        assert_eq!(v["data"]["quizId"], "42");
        assert!(v.get("receivedAt").is_some());
    }

    #[test]
    fn envelope_roundtrip() {
        let e = EventEnvelope::now(event_types::GRADING_COMPLETED, json!({"score": 87}));
        let back: EventEnvelope = serde_json::from_value(serde_json::to_value(&e).unwrap()).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn data_str_present() {
        let e = EventEnvelope::now("X", json!({"room": "quiz:42"}));
        assert_eq!(e.data_str("room"), Some("quiz:42"));
    }

    #[test]
    fn data_str_missing_or_wrong_type() {
        let e = EventEnvelope::now("X", json!({"count": 3}));
        assert_eq!(e.data_str("room"), None);
        assert_eq!(e.data_str("count"), None);
    }

    #[test]
    fn reserved_frames_recognized() {
        assert!(is_reserved_frame("connected"));
        assert!(is_reserved_frame("heartbeat"));
        assert!(!is_reserved_frame("QUIZ_STARTED"));
        assert!(!is_reserved_frame(""));
    }
}
