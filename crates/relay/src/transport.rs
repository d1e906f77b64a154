//! Frame-boundary transport: payload shapes and inbound normalization.

use serde_json::Value;
use sill_proto::Envelope;

/// A payload crossing the frame boundary, in either direction.
///
/// The boundary primitive carries strings or structured objects. Mobile
/// hosts only accept strings, so the outbound shape is chosen per
/// session; inbound, both shapes arrive and normalize the same way.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
	/// JSON text.
	Text(String),
	/// Already-structured value.
	Structured(Value),
}

/// A raw inbound event as delivered by the embedding glue.
#[derive(Debug, Clone)]
pub struct FrameEvent {
	/// Origin declared by the sender.
	pub origin: String,
	/// Raw payload, not yet normalized.
	pub payload: FramePayload,
}

impl FrameEvent {
	/// Convenience constructor for embedding glue and tests.
	#[must_use]
	pub fn new(origin: impl Into<String>, payload: FramePayload) -> Self {
		Self { origin: origin.into(), payload }
	}
}

/// Outbound half of the boundary: posts one payload to the peer frame.
///
/// Implementations wrap whatever the embedding offers (a browser
/// `postMessage`, a webview bridge, a test recorder). Posting must not
/// call back into the relay synchronously.
pub trait HostPort: Send + Sync {
	/// Delivers `payload` to the peer, scoped to `target_origin`.
	fn post(&self, payload: FramePayload, target_origin: &str);
}

/// Decodes a raw payload into an envelope.
///
/// String payloads parse as JSON only when they encode an object or an
/// array; scalar JSON, `null`, and unparseable text are rejected, as is
/// any value the envelope shape does not fit. `None` means drop.
pub fn decode_payload(payload: FramePayload) -> Option<Envelope> {
	let value = match payload {
		FramePayload::Text(text) => match serde_json::from_str::<Value>(&text) {
			Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
			_ => return None,
		},
		FramePayload::Structured(value) => value,
	};
	serde_json::from_value(value).ok()
}

/// Referrer filter: an event passes when no referrer origin is pinned
/// or when it matches the event origin exactly.
pub(crate) fn referrer_admits(referrer_origin: Option<&str>, event_origin: &str) -> bool {
	match referrer_origin {
		Some(expected) if !expected.is_empty() => expected == event_origin,
		_ => true,
	}
}
