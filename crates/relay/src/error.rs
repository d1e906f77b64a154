//! Error types for the relay.

use thiserror::Error;

/// Errors surfaced synchronously to the embedding application.
///
/// Protocol anomalies (origin mismatches, malformed payloads, unmatched
/// replies) are never errors; the relay drops those envelopes silently
/// so a hostile frame learns nothing from probing.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
	/// The relay was initialized more than once.
	#[error("relay already initialized")]
	AlreadyInitialized,
	/// A document operation arrived before any document streamed in.
	#[error("no document has streamed from the host yet")]
	NoDocument,
	/// Component data keys must be non-empty strings.
	#[error("component data key must not be empty")]
	InvalidDataKey,
	/// The relay was disposed and accepts no further operations.
	#[error("relay disposed")]
	Disposed,
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
