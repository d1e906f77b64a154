//! Theme stylesheet reconciliation.
//!
//! The host pushes a desired set of stylesheet urls (at registration and
//! whenever the user switches themes); the reconciler diffs it against
//! what is active and emits the minimal insert/remove operations for the
//! presentation layer to apply.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Presentation-layer collaborator that owns stylesheet elements.
///
/// Implementations insert and remove the actual link elements (or
/// whatever the embedding renders stylesheets with); the reconciler only
/// decides which tagged elements must exist.
pub trait ThemeSink: Send {
	/// Inserts a stylesheet reference for `url`, tagged `element_id`.
	fn insert(&mut self, element_id: &str, url: &str);
	/// Removes the element tagged `element_id`.
	fn remove(&mut self, element_id: &str);
}

/// One presentation mutation produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeOp {
	/// Insert a stylesheet element.
	Insert {
		/// Element tag derived from the url.
		element_id: String,
		/// Stylesheet url.
		url: String,
	},
	/// Remove a stylesheet element.
	Remove {
		/// Element tag derived from the url.
		element_id: String,
	},
}

/// Stable element identifier for a theme url.
///
/// Urls are base64-encoded rather than used directly: arbitrary urls
/// make unreliable element identifiers (local file urls especially).
#[must_use]
pub fn element_id(url: &str) -> String {
	BASE64.encode(url)
}

/// Active theme set plus the diffing that keeps presentation in sync.
#[derive(Debug, Default)]
pub struct ThemeReconciler {
	accepts_themes: bool,
	active: Vec<String>,
}

impl ThemeReconciler {
	/// Creates a reconciler. When the component does not accept themes,
	/// every desired set is ignored.
	#[must_use]
	pub fn new(accepts_themes: bool) -> Self {
		Self { accepts_themes, active: Vec::new() }
	}

	/// Urls currently considered active, in the order the host sent.
	#[must_use]
	pub fn active(&self) -> &[String] {
		&self.active
	}

	/// Reconciles the active set against `incoming`.
	///
	/// Returns `None` when nothing changed: themes are not accepted, or
	/// the two sets are equal as sorted sequences (order and duplicates
	/// aside, nothing to do). Otherwise active urls missing from
	/// `incoming` become removals, unseen incoming urls become inserts
	/// (empty urls are skipped but still count toward set equality), and
	/// the active list is replaced wholesale with `incoming`, order
	/// preserved.
	pub fn reconcile(&mut self, incoming: Vec<String>) -> Option<Vec<ThemeOp>> {
		if !self.accepts_themes {
			return None;
		}
		if sorted(&self.active) == sorted(&incoming) {
			return None;
		}
		let mut ops = Vec::new();
		for url in &self.active {
			if !incoming.contains(url) {
				ops.push(ThemeOp::Remove { element_id: element_id(url) });
			}
		}
		for url in &incoming {
			if url.is_empty() || self.active.contains(url) {
				continue;
			}
			ops.push(ThemeOp::Insert { element_id: element_id(url), url: url.clone() });
		}
		self.active = incoming;
		Some(ops)
	}
}

fn sorted(urls: &[String]) -> Vec<&String> {
	let mut sorted: Vec<&String> = urls.iter().collect();
	sorted.sort();
	sorted
}
