//! Timer seam for the relay.
//!
//! Everything time-based (save debouncing, reply timeouts, deferred
//! observer delivery) goes through [`Scheduler`], which keeps the state
//! machines free of runtime wiring. Production embeddings install
//! [`TokioScheduler`]; tests drive a [`ManualScheduler`] by hand.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Deferred action fired by a scheduler.
pub type ScheduledAction = Box<dyn FnOnce() + Send + 'static>;

/// Cancellable handle to one scheduled action.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
	cancel: CancellationToken,
}

impl ScheduleHandle {
	/// Wraps a cancellation token observed by the scheduler backend.
	#[must_use]
	pub fn new(cancel: CancellationToken) -> Self {
		Self { cancel }
	}

	/// Requests cancellation; a cancelled action never fires.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// True once cancellation was requested.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

/// Source of cancellable one-shot timers.
pub trait Scheduler: Send + Sync {
	/// Runs `action` after `delay` unless the returned handle is
	/// cancelled first. A zero delay means the next scheduler turn, not
	/// synchronously within this call.
	fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduleHandle;
}

/// Scheduler backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
	handle: tokio::runtime::Handle,
}

impl TokioScheduler {
	/// Captures the current runtime handle.
	///
	/// # Panics
	///
	/// Panics when called outside a tokio runtime; use
	/// [`TokioScheduler::with_handle`] from foreign threads.
	#[must_use]
	pub fn new() -> Self {
		Self { handle: tokio::runtime::Handle::current() }
	}

	/// Wraps an explicit runtime handle.
	#[must_use]
	pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
		Self { handle }
	}
}

impl Default for TokioScheduler {
	fn default() -> Self {
		Self::new()
	}
}

impl Scheduler for TokioScheduler {
	fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduleHandle {
		let token = CancellationToken::new();
		let guard = token.clone();
		self.handle.spawn(async move {
			tokio::select! {
				_ = guard.cancelled() => {}
				_ = tokio::time::sleep(delay) => action(),
			}
		});
		ScheduleHandle::new(token)
	}
}

struct ManualEntry {
	delay: Duration,
	handle: ScheduleHandle,
	action: ScheduledAction,
}

/// Deterministic scheduler for tests and runtime-free embeddings.
///
/// Actions accumulate until [`ManualScheduler::fire_all`] runs them on
/// the caller's thread. Clones share the same queue, so a test can keep
/// one handle while the relay holds another.
#[derive(Clone, Default)]
pub struct ManualScheduler {
	entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualScheduler {
	/// Creates an empty manual scheduler.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of actions scheduled and not yet fired, cancelled ones
	/// included.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.entries.lock().len()
	}

	/// Delays of the scheduled actions, in schedule order.
	#[must_use]
	pub fn scheduled_delays(&self) -> Vec<Duration> {
		self.entries.lock().iter().map(|entry| entry.delay).collect()
	}

	/// Fires every live action in schedule order and discards cancelled
	/// entries. Returns how many actions ran. Actions scheduled while
	/// firing are left for the next call.
	pub fn fire_all(&self) -> usize {
		let entries = std::mem::take(&mut *self.entries.lock());
		let mut fired = 0;
		for entry in entries {
			if entry.handle.is_cancelled() {
				continue;
			}
			(entry.action)();
			fired += 1;
		}
		fired
	}
}

impl Scheduler for ManualScheduler {
	fn schedule(&self, delay: Duration, action: ScheduledAction) -> ScheduleHandle {
		let handle = ScheduleHandle::new(CancellationToken::new());
		self.entries.lock().push(ManualEntry { delay, handle: handle.clone(), action });
		handle
	}
}

impl fmt::Debug for ManualScheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualScheduler")
			.field("pending", &self.pending())
			.finish()
	}
}
