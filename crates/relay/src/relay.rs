//! The relay itself: handshake, routing, and the component-facing API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use sill_proto::{
	Action, ApiTag, ContextItemInfo, DocumentItem, Envelope, Environment, HostMessage, MessageId,
	RegistrationInfo, SessionKey,
};

use crate::config::RelayConfig;
use crate::correlate::{
	Matched, Outbound, PendingKind, PendingReply, Reply, ReplyCallback, fresh_message_id,
};
use crate::error::{RelayError, Result};
use crate::save::{PREVIEW_LIMIT, SaveCallback, SaveCoalescer, preview_text};
use crate::schedule::Scheduler;
use crate::session::{Admission, PeerSession, SessionStage};
use crate::themes::{ThemeOp, ThemeReconciler, ThemeSink};
use crate::transport::{FrameEvent, FramePayload, HostPort, decode_payload, referrer_admits};

/// Observer invoked with the current document text and editor metadata.
pub type Observer = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Callback fired after the active theme set changes.
pub type ThemesChangedFn = Arc<dyn Fn() + Send + Sync>;

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Mediator between an embedded component and its host application.
///
/// The embedding glue wires the boundary once: outbound posts go
/// through the [`HostPort`], stylesheet mutations through the
/// [`ThemeSink`], timers through the [`Scheduler`], and every raw
/// inbound event is fed to [`Relay::handle_event`]. Handles are cheap
/// to clone and share one session.
#[derive(Clone)]
pub struct Relay {
	inner: Arc<Mutex<RelayInner>>,
	host: Arc<dyn HostPort>,
	sink: Arc<Mutex<Box<dyn ThemeSink>>>,
	scheduler: Arc<dyn Scheduler>,
}

struct RelayInner {
	config: RelayConfig,
	session: PeerSession,
	outbound: Outbound,
	themes: ThemeReconciler,
	saves: SaveCoalescer,
	last_item: Option<DocumentItem>,
	observers: Vec<(ObserverId, Observer)>,
	next_observer: u64,
	on_themes_changed: Option<ThemesChangedFn>,
	initialized: bool,
	disposed: bool,
}

/// Outward work computed under the state lock and run after releasing
/// it. Host posts, sink mutations, and user callbacks all happen here,
/// so a callback that re-enters the relay cannot deadlock.
enum Effect {
	Post(FramePayload, String),
	Theme(ThemeOp),
	ThemesChanged(ThemesChangedFn),
	Reply(ReplyCallback, Reply),
	FanOut(Vec<Observer>, String, Value),
}

impl Relay {
	/// Creates a relay wired to its collaborators. Nothing flows until
	/// [`Relay::initialize`] runs and the host registers the component.
	#[must_use]
	pub fn new(
		config: RelayConfig,
		host: Arc<dyn HostPort>,
		sink: Box<dyn ThemeSink>,
		scheduler: Arc<dyn Scheduler>,
	) -> Self {
		let inner = RelayInner {
			themes: ThemeReconciler::new(config.accepts_themes),
			saves: SaveCoalescer::new(config.coalesce_delay),
			config,
			session: PeerSession::default(),
			outbound: Outbound::default(),
			last_item: None,
			observers: Vec::new(),
			next_observer: 0,
			on_themes_changed: None,
			initialized: false,
			disposed: false,
		};
		Self {
			inner: Arc::new(Mutex::new(inner)),
			host,
			sink: Arc::new(Mutex::new(sink)),
			scheduler,
		}
	}

	/// Starts the session: parks the long-lived document subscription,
	/// which the handshake will dispatch to the host.
	pub fn initialize(&self) -> Result<()> {
		{
			let mut inner = self.inner.lock();
			if inner.disposed {
				return Err(RelayError::Disposed);
			}
			if inner.initialized {
				return Err(RelayError::AlreadyInitialized);
			}
			inner.initialized = true;
		}
		self.send(Action::StreamContextItem, json!({}), PendingKind::ContextStream);
		Ok(())
	}

	/// Feeds one raw boundary event into the relay.
	///
	/// This never fails: events that do not survive the referrer filter,
	/// payload normalization, routing, or the origin lock are dropped
	/// silently (trace-logged only, so a probing frame learns nothing).
	pub fn handle_event(&self, event: FrameEvent) {
		let referrer = self.inner.lock().config.referrer_origin.clone();
		if !referrer_admits(referrer.as_deref(), &event.origin) {
			tracing::trace!(origin = %event.origin, "dropping event: referrer mismatch");
			return;
		}
		let Some(envelope) = decode_payload(event.payload) else {
			tracing::trace!(origin = %event.origin, "dropping event: undecodable payload");
			return;
		};
		let Some(message) = HostMessage::classify(envelope) else {
			tracing::trace!(origin = %event.origin, "dropping event: unroutable message");
			return;
		};
		self.route(&event.origin, message);
	}

	fn route(&self, origin: &str, message: HostMessage) {
		let is_registration = matches!(message, HostMessage::Registered { .. });
		let mut effects = Vec::new();
		{
			let mut inner = self.inner.lock();
			if inner.disposed {
				tracing::trace!("dropping event: relay disposed");
				return;
			}
			if inner.session.admit(origin, is_registration) == Admission::Reject {
				tracing::debug!(%origin, "dropping event: origin lock");
				return;
			}
			match message {
				HostMessage::Registered { session_key, component_data, info } => {
					self.register_locked(&mut inner, session_key, component_data, info, &mut effects);
				}
				HostMessage::Themes(urls) => {
					reconcile_themes_locked(&mut inner, urls, &mut effects);
				}
				HostMessage::Reply { original, data } => match inner.outbound.resolve(&original) {
					Matched::OneShot(callback) => {
						tracing::debug!(id = %original, "reply matched");
						if let Some(callback) = callback {
							effects.push(Effect::Reply(callback, Reply::Data(data)));
						}
					}
					Matched::ContextStream => {
						self.context_item_locked(&mut inner, data, &mut effects);
					}
					Matched::Unknown => {
						tracing::trace!(id = %original, "dropping reply: unknown correlation id");
					}
				},
			}
		}
		self.run_effects(effects);
	}

	/// Registration (or re-registration from the locked origin): record
	/// the session, flush parked requests in order, bring themes up to
	/// date, and acknowledge.
	fn register_locked(
		&self,
		inner: &mut RelayInner,
		session_key: SessionKey,
		component_data: Option<Map<String, Value>>,
		info: RegistrationInfo,
		effects: &mut Vec<Effect>,
	) {
		let rejoined = inner.session.stage == SessionStage::Registered;
		inner.session.register(session_key, component_data, &info);
		tracing::info!(
			environment = ?inner.session.environment,
			platform = ?inner.session.platform,
			rejoined,
			"component registered"
		);
		for parked in inner.outbound.drain_parked() {
			if let Some((payload, origin)) =
				self.dispatch_locked(inner, parked.action, parked.data, parked.kind)
			{
				effects.push(Effect::Post(payload, origin));
			}
		}
		reconcile_themes_locked(inner, info.active_theme_urls, effects);
		if let Some((payload, origin)) =
			self.dispatch_locked(inner, Action::ThemesActivated, json!({}), PendingKind::OneShot(None))
		{
			effects.push(Effect::Post(payload, origin));
		}
	}

	/// One event on the document stream.
	fn context_item_locked(&self, inner: &mut RelayInner, data: Value, effects: &mut Vec<Effect>) {
		let item = match serde_json::from_value::<ContextItemInfo>(data) {
			Ok(info) => info.item,
			Err(error) => {
				tracing::trace!(%error, "dropping malformed stream payload");
				return;
			}
		};
		let switched = inner.last_item.as_ref().is_none_or(|last| last.uuid != item.uuid);
		if switched && inner.saves.timer_pending() {
			// The active document is being replaced while an edit sits in
			// the quiet window. Flush now or the edit is lost.
			tracing::debug!(uuid = %item.uuid, "document switch with pending save, flushing");
			self.flush_locked(inner, effects);
		}
		let metadata_only = item.is_metadata_update;
		tracing::trace!(uuid = %item.uuid, metadata_only, "document streamed");
		inner.last_item = Some(item);
		if metadata_only {
			return;
		}
		let observers: Vec<Observer> =
			inner.observers.iter().map(|(_, observer)| observer.clone()).collect();
		if !observers.is_empty() {
			effects.push(Effect::FanOut(observers, current_text(inner), current_meta(inner)));
		}
	}

	/// Queues a request, or dispatches it immediately once a session
	/// exists.
	fn send(&self, action: Action, data: Value, kind: PendingKind) {
		let posted = {
			let mut inner = self.inner.lock();
			if inner.disposed {
				return;
			}
			if inner.session.session_key.is_none() {
				tracing::trace!(%action, parked = inner.outbound.parked_len() + 1, "parking request until registration");
				inner.outbound.park(action, data, kind);
				None
			} else {
				self.dispatch_locked(&mut inner, action, data, kind)
			}
		};
		if let Some((payload, origin)) = posted {
			self.host.post(payload, &origin);
		}
	}

	/// Assigns a correlation id, snapshots the envelope, registers the
	/// pending entry, arms the reply timeout, and encodes for the peer's
	/// runtime. The caller posts the returned payload after unlocking.
	fn dispatch_locked(
		&self,
		inner: &mut RelayInner,
		action: Action,
		data: Value,
		kind: PendingKind,
	) -> Option<(FramePayload, String)> {
		let session_key = inner.session.session_key.clone()?;
		let origin = inner.session.origin.clone()?;
		let id = fresh_message_id();
		let envelope = Envelope {
			action,
			data,
			message_id: Some(id.clone()),
			session_key: Some(session_key),
			component_data: None,
			api: ApiTag::Component,
			original: None,
		};
		let snapshot = match serde_json::to_value(&envelope) {
			Ok(snapshot) => snapshot,
			Err(error) => {
				tracing::warn!(action = %envelope.action, %error, "failed to encode outbound envelope");
				return None;
			}
		};
		let timeout = match (&kind, inner.config.reply_timeout) {
			(PendingKind::OneShot(_), Some(after)) => {
				let relay = self.clone();
				let lapse_id = id.clone();
				Some(self.scheduler.schedule(after, Box::new(move || relay.lapse_reply(&lapse_id))))
			}
			_ => None,
		};
		let payload = if inner.session.is_mobile() {
			// The mobile bridge only accepts strings.
			FramePayload::Text(snapshot.to_string())
		} else {
			FramePayload::Structured(snapshot.clone())
		};
		tracing::debug!(action = %envelope.action, %id, "posting request");
		inner.outbound.register(id, PendingReply { snapshot, kind, timeout });
		Some((payload, origin))
	}

	fn lapse_reply(&self, id: &MessageId) {
		let callback = self.inner.lock().outbound.lapse(id);
		if let Some(callback) = callback {
			tracing::debug!(%id, "reply timed out");
			callback(Reply::Lapsed);
		}
	}

	/// Replaces the document text and schedules a coalesced save.
	///
	/// Fails with [`RelayError::NoDocument`] until the host has streamed
	/// a document.
	pub fn update_text(&self, text: impl Into<String>) -> Result<()> {
		self.mutate_and_save(
			|item| {
				item.content.text = text.into();
			},
			None,
		)
	}

	/// Replaces the editor metadata stored on the document and schedules
	/// a coalesced save.
	pub fn update_meta(&self, meta: Value) -> Result<()> {
		self.mutate_and_save(
			|item| {
				item.set_editor_meta(meta);
			},
			None,
		)
	}

	/// Queues a save of the current document without changing it and
	/// runs `done` once the host acknowledges the write. Useful when
	/// state worth persisting lives outside the text, or to observe a
	/// flush in tests.
	pub fn save_with(&self, done: impl FnOnce() + Send + 'static) -> Result<()> {
		self.mutate_and_save(|_| {}, Some(Box::new(done)))
	}

	fn mutate_and_save(
		&self,
		mutate: impl FnOnce(&mut DocumentItem),
		callback: Option<SaveCallback>,
	) -> Result<()> {
		let mut effects = Vec::new();
		let result = {
			let mut inner = self.inner.lock();
			if inner.disposed {
				Err(RelayError::Disposed)
			} else {
				match inner.last_item.as_mut() {
					None => Err(RelayError::NoDocument),
					Some(item) => {
						mutate(item);
						self.queue_save_locked(&mut inner, callback, &mut effects);
						Ok(())
					}
				}
			}
		};
		self.run_effects(effects);
		result
	}

	/// Either dispatches immediately (zero quiet window) or merges into
	/// the batch and restarts the flush timer.
	fn queue_save_locked(
		&self,
		inner: &mut RelayInner,
		callback: Option<SaveCallback>,
		effects: &mut Vec<Effect>,
	) {
		let Some(item) = inner.last_item.clone() else {
			return;
		};
		let delay = inner.saves.delay();
		if delay.is_zero() {
			self.dispatch_save_locked(inner, vec![item], callback, effects);
			return;
		}
		inner.saves.absorb(item, callback);
		let relay = self.clone();
		let timer = self.scheduler.schedule(delay, Box::new(move || relay.flush()));
		inner.saves.arm(timer);
	}

	/// Flushes any pending save batch immediately.
	///
	/// The quiet-window timer lands here; it is also the explicit
	/// counterpart of the forced flush that runs when the host switches
	/// the active document. A relay with nothing pending does nothing.
	pub fn flush(&self) {
		let mut effects = Vec::new();
		{
			let mut inner = self.inner.lock();
			self.flush_locked(&mut inner, &mut effects);
		}
		self.run_effects(effects);
	}

	fn flush_locked(&self, inner: &mut RelayInner, effects: &mut Vec<Effect>) {
		let Some((items, callback)) = inner.saves.drain() else {
			return;
		};
		self.dispatch_save_locked(inner, items, callback, effects);
	}

	fn dispatch_save_locked(
		&self,
		inner: &mut RelayInner,
		mut items: Vec<DocumentItem>,
		callback: Option<SaveCallback>,
		effects: &mut Vec<Effect>,
	) {
		if let Some(first) = items.first_mut() {
			let preview = match &inner.config.preview {
				Some(custom) => custom(&first.content.text),
				None => preview_text(&first.content.text, PREVIEW_LIMIT),
			};
			first.content.preview_plain = Some(preview);
		}
		let wired: Vec<DocumentItem> = items.iter().map(DocumentItem::wire_copy).collect();
		let kind = PendingKind::OneShot(callback.map(|done| -> ReplyCallback {
			Box::new(move |reply| {
				if matches!(reply, Reply::Data(_)) {
					done();
				}
			})
		}));
		tracing::debug!(items = wired.len(), "flushing save batch");
		if let Some((payload, origin)) =
			self.dispatch_locked(inner, Action::SaveItems, json!({ "items": wired }), kind)
		{
			effects.push(Effect::Post(payload, origin));
		}
	}

	/// Registers an observer for document updates.
	///
	/// On every content-bearing stream event the observer runs with the
	/// new text and metadata. When a document is already known, the
	/// observer additionally receives the current pair on the next
	/// scheduler turn rather than synchronously, so subscribing from
	/// inside another callback is safe.
	pub fn subscribe(&self, observer: impl Fn(&str, &Value) + Send + Sync + 'static) -> ObserverId {
		let observer: Observer = Arc::new(observer);
		let (id, replay) = {
			let mut inner = self.inner.lock();
			let id = ObserverId(inner.next_observer);
			inner.next_observer += 1;
			inner.observers.push((id, observer));
			(id, inner.last_item.is_some() && !inner.disposed)
		};
		if replay {
			let relay = self.clone();
			let _ = self
				.scheduler
				.schedule(Duration::ZERO, Box::new(move || relay.deliver_current(id)));
		}
		id
	}

	/// Removes an observer. Unknown ids are a no-op. An in-flight
	/// delivery may still complete; no further ones start.
	pub fn unsubscribe(&self, id: ObserverId) {
		self.inner.lock().observers.retain(|(known, _)| *known != id);
	}

	/// Deferred first delivery for a late subscriber. Reads the current
	/// pair at delivery time, and skips silently when the observer
	/// already unsubscribed or the document went away.
	fn deliver_current(&self, id: ObserverId) {
		let delivery = {
			let inner = self.inner.lock();
			match inner.observers.iter().find(|(known, _)| *known == id) {
				Some((_, observer)) if inner.last_item.is_some() && !inner.disposed => {
					Some((observer.clone(), current_text(&inner), current_meta(&inner)))
				}
				_ => None,
			}
		};
		if let Some((observer, text, meta)) = delivery {
			observer(&text, &meta);
		}
	}

	/// Registers the callback fired after the active theme set changes.
	pub fn on_themes_changed(&self, callback: impl Fn() + Send + Sync + 'static) {
		self.inner.lock().on_themes_changed = Some(Arc::new(callback));
	}

	/// Current document text; empty before any stream event.
	#[must_use]
	pub fn text(&self) -> String {
		current_text(&self.inner.lock())
	}

	/// Current editor metadata; an empty object before any stream event,
	/// `null` when the document has none recorded.
	#[must_use]
	pub fn meta(&self) -> Value {
		current_meta(&self.inner.lock())
	}

	/// Runtime environment reported by the host, once registered.
	#[must_use]
	pub fn environment(&self) -> Option<Environment> {
		self.inner.lock().session.environment
	}

	/// Platform name reported by the host, once registered.
	#[must_use]
	pub fn platform(&self) -> Option<String> {
		self.inner.lock().session.platform.clone()
	}

	/// Identity the host assigned to this component, once registered.
	#[must_use]
	pub fn component_uuid(&self) -> Option<String> {
		self.inner.lock().session.component_uuid.clone()
	}

	/// True when the host runs in a browser.
	#[must_use]
	pub fn is_browser(&self) -> bool {
		self.environment() == Some(Environment::Web)
	}

	/// True when the host is the desktop application.
	#[must_use]
	pub fn is_desktop(&self) -> bool {
		self.environment() == Some(Environment::Desktop)
	}

	/// True when the host is the mobile wrapper.
	#[must_use]
	pub fn is_mobile(&self) -> bool {
		self.environment() == Some(Environment::NativeMobileWeb)
	}

	/// True when the current document is locked host-side. Reads the
	/// host's status flag; `false` with no document.
	#[must_use]
	pub fn locked(&self) -> bool {
		self.host_flag("locked")
	}

	/// True when the current document is archived host-side.
	#[must_use]
	pub fn archived(&self) -> bool {
		self.host_flag("archived")
	}

	/// True when the current document is pinned host-side.
	#[must_use]
	pub fn pinned(&self) -> bool {
		self.host_flag("pinned")
	}

	/// True when the current document is trashed host-side.
	#[must_use]
	pub fn trashed(&self) -> bool {
		self.host_flag("trashed")
	}

	/// True when the current document is starred host-side.
	#[must_use]
	pub fn starred(&self) -> bool {
		self.host_flag("starred")
	}

	fn host_flag(&self, flag: &str) -> bool {
		self.inner
			.lock()
			.last_item
			.as_ref()
			.is_some_and(|item| item.host_flag(flag))
	}

	/// Theme urls currently active, in host order.
	#[must_use]
	pub fn active_themes(&self) -> Vec<String> {
		self.inner.lock().themes.active().to_vec()
	}

	/// Stored component-data value for `key`.
	#[must_use]
	pub fn component_data_value(&self, key: &str) -> Option<Value> {
		self.inner.lock().session.component_data.get(key).cloned()
	}

	/// Stores `value` under `key` in the component data blob and pushes
	/// the whole blob to the host. Keys must be non-empty.
	pub fn set_component_data_value(&self, key: impl Into<String>, value: Value) -> Result<()> {
		let key = key.into();
		if key.is_empty() {
			return Err(RelayError::InvalidDataKey);
		}
		let blob = {
			let mut inner = self.inner.lock();
			if inner.disposed {
				return Err(RelayError::Disposed);
			}
			inner.session.component_data.insert(key, value);
			Value::Object(inner.session.component_data.clone())
		};
		self.send(Action::SetComponentData, json!({ "componentData": blob }), PendingKind::OneShot(None));
		Ok(())
	}

	/// Clears the component data blob, locally and host-side.
	pub fn clear_component_data(&self) -> Result<()> {
		{
			let mut inner = self.inner.lock();
			if inner.disposed {
				return Err(RelayError::Disposed);
			}
			inner.session.component_data.clear();
		}
		self.send(Action::SetComponentData, json!({ "componentData": {} }), PendingKind::OneShot(None));
		Ok(())
	}

	/// Ends the relay's life: flushes any pending save batch, cancels
	/// every timer, and drops observers, pending replies, and the
	/// current document. Later inbound events are dropped and mutating
	/// calls fail with [`RelayError::Disposed`]. Idempotent.
	pub fn dispose(&self) {
		let mut effects = Vec::new();
		{
			let mut inner = self.inner.lock();
			if inner.disposed {
				return;
			}
			self.flush_locked(&mut inner, &mut effects);
			inner.disposed = true;
			inner.outbound.clear();
			inner.observers.clear();
			inner.on_themes_changed = None;
			inner.last_item = None;
		}
		self.run_effects(effects);
		tracing::debug!("relay disposed");
	}

	fn run_effects(&self, effects: Vec<Effect>) {
		for effect in effects {
			match effect {
				Effect::Post(payload, origin) => self.host.post(payload, &origin),
				Effect::Theme(op) => {
					let mut sink = self.sink.lock();
					match op {
						ThemeOp::Insert { element_id, url } => sink.insert(&element_id, &url),
						ThemeOp::Remove { element_id } => sink.remove(&element_id),
					}
				}
				Effect::ThemesChanged(callback) => callback(),
				Effect::Reply(callback, reply) => callback(reply),
				Effect::FanOut(observers, text, meta) => {
					for observer in &observers {
						observer(&text, &meta);
					}
				}
			}
		}
	}
}

fn reconcile_themes_locked(inner: &mut RelayInner, incoming: Vec<String>, effects: &mut Vec<Effect>) {
	let Some(ops) = inner.themes.reconcile(incoming) else {
		return;
	};
	tracing::debug!(ops = ops.len(), active = inner.themes.active().len(), "themes reconciled");
	effects.extend(ops.into_iter().map(Effect::Theme));
	if let Some(callback) = inner.on_themes_changed.clone() {
		effects.push(Effect::ThemesChanged(callback));
	}
}

fn current_text(inner: &RelayInner) -> String {
	inner
		.last_item
		.as_ref()
		.map(|item| item.content.text.clone())
		.unwrap_or_default()
}

fn current_meta(inner: &RelayInner) -> Value {
	match &inner.last_item {
		Some(item) => item.editor_meta(),
		None => json!({}),
	}
}

impl fmt::Debug for Relay {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("Relay")
			.field("stage", &inner.session.stage)
			.field("origin", &inner.session.origin)
			.field("parked", &inner.outbound.parked_len())
			.field("pending", &inner.outbound.pending_len())
			.field("observers", &inner.observers.len())
			.field("disposed", &inner.disposed)
			.finish_non_exhaustive()
	}
}
