//! Wire frame decoding.
//!
//! One inbound SSE frame becomes one [`EventEnvelope`] or is dropped. A parse
//! failure is logged and counted, never fatal: one malformed frame must not
//! break the connection.

use metrics::counter;
use quizcast_core::EventEnvelope;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Frame body as sent by the server: a type discriminator plus an opaque
/// event-specific payload.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decode one non-reserved frame into an envelope.
///
/// The JSON `type` discriminator wins; an absent or empty discriminator falls
/// back to the SSE frame name. Frames with neither, or with a non-JSON body,
/// yield `None`.
#[must_use]
pub fn decode_frame(frame_name: &str, body: &str) -> Option<EventEnvelope> {
    let frame: WireFrame = match serde_json::from_str(body) {
        Ok(f) => f,
        Err(e) => {
            counter!("quizcast_decode_failures_total").increment(1);
            warn!(frame_name, error = %e, "dropping malformed frame");
            return None;
        }
    };

    let event_type = frame
        .event_type
        .filter(|t| !t.is_empty())
        .or_else(|| (!frame_name.is_empty()).then(|| frame_name.to_string()))?;

    Some(EventEnvelope::now(event_type, frame.data))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
