//! Delivery filters.
//!
//! One general filter shape (event types AND room AND predicate) with
//! convenience constructors for the two common cases. Filter evaluation never
//! raises: a malformed or missing field is a non-match, and a panicking
//! predicate is caught and treated as a non-match.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use quizcast_core::EventEnvelope;
use serde_json::Value;
use tracing::warn;

/// Consumer-supplied predicate over the envelope payload.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Criteria deciding whether an envelope is delivered to a subscription.
///
/// All set criteria must hold (AND). An empty type set matches every type.
#[derive(Clone, Default)]
pub struct EventFilter {
    types: Vec<String>,
    room: Option<String>,
    predicate: Option<Predicate>,
}

impl EventFilter {
    /// Match every envelope.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match a single event type.
    #[must_use]
    pub fn for_type(event_type: impl Into<String>) -> Self {
        Self::all().with_type(event_type)
    }

    /// Match envelopes scoped to a room (e.g. `"quiz:42"`).
    #[must_use]
    pub fn for_room(room: impl Into<String>) -> Self {
        Self::all().with_room(room)
    }

    /// Add an event type to the accepted set.
    #[must_use]
    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.types.push(event_type.into());
        self
    }

    /// Restrict to one room. Composes with the type set.
    #[must_use]
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Restrict with an arbitrary predicate over the payload.
    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `envelope` passes every set criterion.
    #[must_use]
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if !self.types.is_empty() && !self.types.iter().any(|t| t == &envelope.event_type) {
            return false;
        }
        if let Some(room) = &self.room
            && !room_matches(room, &envelope.data)
        {
            return false;
        }
        if let Some(predicate) = &self.predicate {
            let data = &envelope.data;
            match catch_unwind(AssertUnwindSafe(|| predicate(data))) {
                Ok(v) => return v,
                Err(_) => {
                    warn!(event_type = %envelope.event_type, "subscription predicate panicked; treating as non-match");
                    return false;
                }
            }
        }
        true
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("types", &self.types)
            .field("room", &self.room)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Match a `scope:id` room string against the payload.
///
/// Accepts either an explicit `room` field equal to the full string, or a
/// `{scope}Id` field equal to the id part (string or number).
fn room_matches(room: &str, data: &Value) -> bool {
    if data.get("room").and_then(Value::as_str) == Some(room) {
        return true;
    }
    let Some((scope, id)) = room.split_once(':') else {
        return false;
    };
    match data.get(format!("{scope}Id")) {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
