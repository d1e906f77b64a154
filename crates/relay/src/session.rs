//! Session state for the host handshake.

use serde_json::{Map, Value};
use sill_proto::{Environment, RegistrationInfo, SessionKey};

/// Handshake progress. Registration is terminal; there is no transition
/// back to unregistered short of dropping the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStage {
	/// No registration message seen yet.
	#[default]
	Unregistered,
	/// Handshake complete; origin locked, session key held.
	Registered,
}

/// Outcome of the origin admission check for one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	/// The message may be routed.
	Admit,
	/// The message must be dropped without error.
	Reject,
}

/// Everything the relay knows about its peer.
#[derive(Debug, Default)]
pub struct PeerSession {
	/// Handshake progress.
	pub stage: SessionStage,
	/// Origin locked at first registration; never overwritten.
	pub origin: Option<String>,
	/// Session token for outbound messages; replaced on re-registration.
	pub session_key: Option<SessionKey>,
	/// Runtime environment reported by the host.
	pub environment: Option<Environment>,
	/// Platform name reported by the host.
	pub platform: Option<String>,
	/// Identity the host assigned to this component.
	pub component_uuid: Option<String>,
	/// Component data blob, mirrored host-side.
	pub component_data: Map<String, Value>,
}

impl PeerSession {
	/// Applies the origin-lock policy to one inbound message.
	///
	/// The first registration locks its origin as a side effect. After
	/// that every message must carry the locked origin exactly. Before
	/// any registration, non-registration traffic has no origin to match
	/// and is rejected.
	pub fn admit(&mut self, event_origin: &str, is_registration: bool) -> Admission {
		match &self.origin {
			None if is_registration => {
				self.origin = Some(event_origin.to_string());
				Admission::Admit
			}
			Some(locked) if locked == event_origin => Admission::Admit,
			_ => Admission::Reject,
		}
	}

	/// Records a registration: replaces the session key, captures the
	/// reported capabilities, and takes the component data blob when the
	/// host sent one. Re-registration from the locked origin runs the
	/// same path.
	pub fn register(
		&mut self,
		key: SessionKey,
		component_data: Option<Map<String, Value>>,
		info: &RegistrationInfo,
	) {
		self.stage = SessionStage::Registered;
		self.session_key = Some(key);
		if let Some(data) = component_data {
			self.component_data = data;
		}
		self.environment = info.environment;
		self.platform = info.platform.clone();
		self.component_uuid = info.uuid.clone();
	}

	/// True when the mobile string-payload encoding applies.
	#[must_use]
	pub fn is_mobile(&self) -> bool {
		self.environment == Some(Environment::NativeMobileWeb)
	}
}
