//! Outbound queue and request/reply correlation.
//!
//! Requests made before registration park in a FIFO queue with no id
//! assigned; the handshake flushes them in order. Dispatched requests
//! get a fresh correlation id and an entry in the pending table until
//! their reply arrives, their timeout lapses, or the relay is disposed.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Value;
use sill_proto::{Action, MessageId};

use crate::schedule::ScheduleHandle;

/// Reply outcome delivered to a request callback.
#[derive(Debug)]
pub enum Reply {
	/// The host answered.
	Data(Value),
	/// The configured reply timeout elapsed with no answer.
	Lapsed,
}

/// Callback invoked at most once per request.
pub type ReplyCallback = Box<dyn FnOnce(Reply) + Send + 'static>;

/// How replies to a request are consumed.
pub enum PendingKind {
	/// At most one reply; the entry is evicted when matched. `None` when
	/// the sender does not care about the answer.
	OneShot(Option<ReplyCallback>),
	/// The long-lived document subscription. Replies keep flowing for
	/// the life of the session, so the entry is never evicted.
	ContextStream,
}

/// A request parked before the session was established.
pub struct QueuedSend {
	/// Outbound action.
	pub action: Action,
	/// Request payload.
	pub data: Value,
	/// Reply consumption mode once dispatched.
	pub kind: PendingKind,
}

/// A dispatched request awaiting its reply.
pub struct PendingReply {
	/// Serialized snapshot of the envelope as it went out.
	pub snapshot: Value,
	/// Reply consumption mode.
	pub kind: PendingKind,
	/// Timeout timer, when a reply timeout is configured.
	pub timeout: Option<ScheduleHandle>,
}

/// Routing outcome for one inbound reply id.
pub enum Matched {
	/// A one-shot entry matched and was evicted; run the callback with
	/// the reply data if the sender registered one.
	OneShot(Option<ReplyCallback>),
	/// The document subscription matched; the entry stays.
	ContextStream,
	/// Nothing pending references this id.
	Unknown,
}

/// Outbound side of the relay: parked queue plus pending table.
#[derive(Default)]
pub struct Outbound {
	parked: Vec<QueuedSend>,
	pending: HashMap<MessageId, PendingReply>,
}

impl Outbound {
	/// Parks a request until the handshake completes.
	pub fn park(&mut self, action: Action, data: Value, kind: PendingKind) {
		self.parked.push(QueuedSend { action, data, kind });
	}

	/// Takes every parked request in submission order.
	pub fn drain_parked(&mut self) -> Vec<QueuedSend> {
		std::mem::take(&mut self.parked)
	}

	/// Number of parked requests.
	#[must_use]
	pub fn parked_len(&self) -> usize {
		self.parked.len()
	}

	/// Number of dispatched requests awaiting replies.
	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Tracks a dispatched request under its correlation id.
	pub fn register(&mut self, id: MessageId, entry: PendingReply) {
		let previous = self.pending.insert(id, entry);
		debug_assert!(previous.is_none(), "correlation id reused");
	}

	/// Routes an inbound reply id. One-shot matches cancel their timeout
	/// and leave the table; the stream entry is left in place.
	pub fn resolve(&mut self, id: &MessageId) -> Matched {
		match self.pending.entry(id.clone()) {
			Entry::Vacant(_) => Matched::Unknown,
			Entry::Occupied(mut slot) => match &mut slot.get_mut().kind {
				PendingKind::ContextStream => Matched::ContextStream,
				PendingKind::OneShot(callback) => {
					let callback = callback.take();
					let entry = slot.remove();
					if let Some(timer) = entry.timeout {
						timer.cancel();
					}
					Matched::OneShot(callback)
				}
			},
		}
	}

	/// Expires a one-shot entry whose timeout fired, returning its
	/// callback so the caller can signal [`Reply::Lapsed`]. The stream
	/// entry never lapses.
	pub fn lapse(&mut self, id: &MessageId) -> Option<ReplyCallback> {
		match self.pending.entry(id.clone()) {
			Entry::Vacant(_) => None,
			Entry::Occupied(mut slot) => match &mut slot.get_mut().kind {
				PendingKind::ContextStream => None,
				PendingKind::OneShot(callback) => {
					let callback = callback.take();
					slot.remove();
					callback
				}
			},
		}
	}

	/// Drops everything parked and pending, cancelling timeout timers.
	pub fn clear(&mut self) {
		self.parked.clear();
		for (_, entry) in self.pending.drain() {
			if let Some(timer) = entry.timeout {
				timer.cancel();
			}
		}
	}
}

/// Generates a fresh correlation id.
#[must_use]
pub fn fresh_message_id() -> MessageId {
	MessageId(uuid::Uuid::new_v4().to_string())
}
