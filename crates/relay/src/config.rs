//! Relay configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Derives the list preview for a document from its text, run right
/// before a save batch is dispatched.
pub type PreviewFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Default quiet window for save coalescing.
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(250);

/// Tunables for a relay, built in consuming-builder style:
///
/// ```
/// use std::time::Duration;
/// use sill_relay::RelayConfig;
///
/// let config = RelayConfig::new()
/// 	.coalesce_delay(Duration::from_millis(100))
/// 	.referrer_origin("https://host.app");
/// ```
#[derive(Clone)]
pub struct RelayConfig {
	/// Quiet window for save coalescing; zero dispatches every save
	/// immediately without batching.
	pub coalesce_delay: Duration,
	/// Origin of the embedding document, when known at construction.
	/// Inbound events from any other origin are dropped before decoding.
	pub referrer_origin: Option<String>,
	/// Whether host themes are applied to this component.
	pub accepts_themes: bool,
	/// How long a request waits for its reply before the callback is
	/// told the reply lapsed. `None` waits forever.
	pub reply_timeout: Option<Duration>,
	/// Custom preview derivation; the default truncates the text.
	pub preview: Option<PreviewFn>,
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			coalesce_delay: DEFAULT_COALESCE_DELAY,
			referrer_origin: None,
			accepts_themes: true,
			reply_timeout: None,
			preview: None,
		}
	}
}

impl RelayConfig {
	/// Creates the default configuration.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the save-coalescing quiet window; zero disables batching.
	#[must_use]
	pub fn coalesce_delay(mut self, delay: Duration) -> Self {
		self.coalesce_delay = delay;
		self
	}

	/// Restricts inbound events to the given embedding origin.
	#[must_use]
	pub fn referrer_origin(mut self, origin: impl Into<String>) -> Self {
		self.referrer_origin = Some(origin.into());
		self
	}

	/// Sets whether host themes are applied to this component.
	#[must_use]
	pub fn accepts_themes(mut self, accepts: bool) -> Self {
		self.accepts_themes = accepts;
		self
	}

	/// Bounds how long requests wait for their replies.
	#[must_use]
	pub fn reply_timeout(mut self, timeout: Duration) -> Self {
		self.reply_timeout = Some(timeout);
		self
	}

	/// Installs a custom preview generator.
	#[must_use]
	pub fn preview(mut self, preview: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
		self.preview = Some(Arc::new(preview));
		self
	}
}

impl fmt::Debug for RelayConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RelayConfig")
			.field("coalesce_delay", &self.coalesce_delay)
			.field("referrer_origin", &self.referrer_origin)
			.field("accepts_themes", &self.accepts_themes)
			.field("reply_timeout", &self.reply_timeout)
			.field("preview", &self.preview.is_some())
			.finish()
	}
}
