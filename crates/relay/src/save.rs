//! Save coalescing: debounce-with-merge for rapid local edits.
//!
//! Every keystroke asks for a save; dispatching each one would flood the
//! host. Edits instead merge into a pending batch and a quiet-window
//! timer; only the timer firing (or a forced flush) dispatches. Within
//! the batch the last write per document wins.

use std::time::Duration;

use sill_proto::DocumentItem;

use crate::schedule::ScheduleHandle;

/// Callback invoked once the host acknowledges a flushed save.
pub type SaveCallback = Box<dyn FnOnce() + Send + 'static>;

/// Default truncation limit for derived preview text.
pub const PREVIEW_LIMIT: usize = 50;

/// Derives plain preview text for a document.
///
/// Text at or under `limit` characters passes through unchanged; longer
/// text is cut at `limit` characters with a trailing ellipsis.
#[must_use]
pub fn preview_text(text: &str, limit: usize) -> String {
	match text.char_indices().nth(limit) {
		None => text.to_string(),
		Some((cut, _)) => format!("{}...", &text[..cut]),
	}
}

/// Pending batch state for the debounce-with-merge cycle.
///
/// The owner schedules and parks the flush timer here; this type only
/// tracks the batch, so merge semantics stay testable without timers.
pub struct SaveCoalescer {
	delay: Duration,
	batch: Vec<DocumentItem>,
	callback: Option<SaveCallback>,
	timer: Option<ScheduleHandle>,
}

impl SaveCoalescer {
	/// Creates an idle coalescer with the given quiet window.
	#[must_use]
	pub fn new(delay: Duration) -> Self {
		Self { delay, batch: Vec::new(), callback: None, timer: None }
	}

	/// Configured quiet window; zero means batching is disabled.
	#[must_use]
	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// True while a flush timer is outstanding.
	#[must_use]
	pub fn timer_pending(&self) -> bool {
		self.timer.is_some()
	}

	/// Merges `item` into the pending batch and restarts the cycle: any
	/// outstanding timer is cancelled (the caller arms the next one), an
	/// already-pending entry for the same document is superseded and
	/// moves to the back, and `callback` replaces whatever acknowledgment
	/// was parked before. With several edits in one window only the last
	/// callback runs.
	pub fn absorb(&mut self, item: DocumentItem, callback: Option<SaveCallback>) {
		if let Some(timer) = self.timer.take() {
			timer.cancel();
		}
		self.batch.retain(|parked| parked.uuid != item.uuid);
		self.batch.push(item);
		self.callback = callback;
	}

	/// Parks the flush timer for the current batch.
	pub fn arm(&mut self, timer: ScheduleHandle) {
		self.timer = Some(timer);
	}

	/// Drains the batch for dispatch, cancelling any outstanding timer.
	/// Returns `None` when nothing is pending.
	pub fn drain(&mut self) -> Option<(Vec<DocumentItem>, Option<SaveCallback>)> {
		if let Some(timer) = self.timer.take() {
			timer.cancel();
		}
		if self.batch.is_empty() {
			return None;
		}
		Some((std::mem::take(&mut self.batch), self.callback.take()))
	}
}

impl std::fmt::Debug for SaveCoalescer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SaveCoalescer")
			.field("delay", &self.delay)
			.field("batch", &self.batch.len())
			.field("callback", &self.callback.is_some())
			.field("timer", &self.timer.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tokio_util::sync::CancellationToken;

	use super::*;

	fn doc(uuid: &str, text: &str) -> DocumentItem {
		serde_json::from_value(json!({ "uuid": uuid, "content": { "text": text } })).unwrap()
	}

	#[test]
	fn test_preview_passes_short_text_through() {
		assert_eq!(preview_text("hello", 10), "hello");
		assert_eq!(preview_text("abcdefghij", 10), "abcdefghij");
		assert_eq!(preview_text("", 10), "");
	}

	#[test]
	fn test_preview_truncates_long_text() {
		assert_eq!(preview_text("abcdefghijk", 10), "abcdefghij...");
	}

	#[test]
	fn test_preview_counts_characters_not_bytes() {
		assert_eq!(preview_text("äöüäöü", 3), "äöü...");
	}

	#[test]
	fn test_absorb_merges_last_write_per_document() {
		let mut coalescer = SaveCoalescer::new(Duration::from_millis(250));
		coalescer.absorb(doc("a", "a1"), None);
		coalescer.absorb(doc("b", "b1"), None);
		coalescer.absorb(doc("a", "a2"), None);

		let (batch, _) = coalescer.drain().unwrap();
		assert_eq!(batch.len(), 2);
		// The refreshed document moved to the back.
		assert_eq!(batch[0].uuid, "b");
		assert_eq!(batch[1].uuid, "a");
		assert_eq!(batch[1].content.text, "a2");
	}

	#[test]
	fn test_last_callback_wins() {
		let mut coalescer = SaveCoalescer::new(Duration::from_millis(250));
		coalescer.absorb(doc("a", "a1"), Some(Box::new(|| panic!("superseded callback ran"))));
		coalescer.absorb(doc("a", "a2"), None);

		let (_, callback) = coalescer.drain().unwrap();
		assert!(callback.is_none());
	}

	#[test]
	fn test_absorb_cancels_the_previous_timer() {
		let mut coalescer = SaveCoalescer::new(Duration::from_millis(250));
		coalescer.absorb(doc("a", "a1"), None);
		let timer = ScheduleHandle::new(CancellationToken::new());
		coalescer.arm(timer.clone());
		assert!(coalescer.timer_pending());

		coalescer.absorb(doc("a", "a2"), None);
		assert!(timer.is_cancelled());
		assert!(!coalescer.timer_pending());
	}

	#[test]
	fn test_drain_empties_the_batch() {
		let mut coalescer = SaveCoalescer::new(Duration::from_millis(250));
		assert!(coalescer.drain().is_none());

		coalescer.absorb(doc("a", "a1"), None);
		let timer = ScheduleHandle::new(CancellationToken::new());
		coalescer.arm(timer.clone());

		let (batch, _) = coalescer.drain().unwrap();
		assert_eq!(batch.len(), 1);
		assert!(timer.is_cancelled());
		assert!(coalescer.drain().is_none());
	}
}
