//! Envelope, action vocabulary, and per-action payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Correlation token linking an outbound request to its eventual reply.
///
/// Ids are opaque strings chosen by the sender; random 128-bit values
/// make collisions vanishingly unlikely without any counter state shared
/// across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Session token assigned by the host at registration and echoed on
/// every subsequent outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl fmt::Display for SessionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Message vocabulary exchanged across the frame boundary.
///
/// The host is free to send actions outside this fixed set (its reply
/// marker among them); those decode to [`Action::Other`] and are routed
/// by reply reference or dropped, never failing the whole envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// Component to host: subscribe to the active document stream.
	StreamContextItem,
	/// Component to host: persist a batch of edited items.
	SaveItems,
	/// Component to host: replace the stored component data blob.
	SetComponentData,
	/// Host to component: session established, capabilities attached.
	ComponentRegistered,
	/// Host to component: desired set of active theme stylesheets.
	Themes,
	/// Component to host: acknowledges theme activation.
	ThemesActivated,
	/// Any action outside the fixed vocabulary.
	Other(String),
}

impl Action {
	/// The wire spelling of this action.
	#[must_use]
	pub fn as_str(&self) -> &str {
		match self {
			Self::StreamContextItem => "stream-context-item",
			Self::SaveItems => "save-items",
			Self::SetComponentData => "set-component-data",
			Self::ComponentRegistered => "component-registered",
			Self::Themes => "themes",
			Self::ThemesActivated => "themes-activated",
			Self::Other(tag) => tag,
		}
	}

	/// Parses a wire tag; unknown tags are preserved in [`Action::Other`].
	#[must_use]
	pub fn from_wire(tag: &str) -> Self {
		match tag {
			"stream-context-item" => Self::StreamContextItem,
			"save-items" => Self::SaveItems,
			"set-component-data" => Self::SetComponentData,
			"component-registered" => Self::ComponentRegistered,
			"themes" => Self::Themes,
			"themes-activated" => Self::ThemesActivated,
			other => Self::Other(other.to_string()),
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for Action {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Action {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let tag = String::deserialize(deserializer)?;
		Ok(Self::from_wire(&tag))
	}
}

/// API discriminator carried on every envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiTag {
	/// The component messaging API.
	#[default]
	#[serde(rename = "component")]
	Component,
}

/// Back-reference carried by replies.
///
/// Hosts embed the entire original message here; only the correlation id
/// matters for routing, so everything else is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
	/// Correlation id of the request this message answers.
	#[serde(rename = "messageId")]
	pub message_id: MessageId,
}

/// A single message crossing the frame boundary, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
	/// What this message does.
	pub action: Action,
	/// Action-specific payload; see [`HostMessage::classify`] for the
	/// inbound decoding rules.
	#[serde(default)]
	pub data: Value,
	/// Correlation id; assigned when the message is dispatched, absent
	/// while a request sits in the pre-registration queue.
	#[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
	pub message_id: Option<MessageId>,
	/// Session token; present on everything sent after registration.
	#[serde(rename = "sessionKey", default, skip_serializing_if = "Option::is_none")]
	pub session_key: Option<SessionKey>,
	/// Component data blob attached to registration messages.
	#[serde(rename = "componentData", default, skip_serializing_if = "Option::is_none")]
	pub component_data: Option<Map<String, Value>>,
	/// API discriminator; hosts that omit it get the default.
	#[serde(default)]
	pub api: ApiTag,
	/// Reference to the request this message replies to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original: Option<ReplyRef>,
}

/// Runtime environment reported by the host at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
	/// Browser tab or extension frame.
	#[serde(rename = "web")]
	Web,
	/// Desktop application webview.
	#[serde(rename = "desktop")]
	Desktop,
	/// Mobile wrapper. Its bridge only accepts string payloads, which
	/// changes the outbound encoding for the whole session.
	#[serde(rename = "native-mobile-web")]
	NativeMobileWeb,
}

/// Registration payload carried by `component-registered`.
///
/// Hosts of different vintages disagree on these fields, so each one
/// decodes leniently: an unrecognized or ill-typed value reads as absent
/// rather than failing the registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInfo {
	/// Runtime environment of the host.
	#[serde(default, deserialize_with = "lenient")]
	pub environment: Option<Environment>,
	/// Host platform name, for example `linux` or `macos`.
	#[serde(default, deserialize_with = "lenient")]
	pub platform: Option<String>,
	/// Identity the host assigned to this component.
	#[serde(default, deserialize_with = "lenient")]
	pub uuid: Option<String>,
	/// Theme stylesheets active in the host when the session began.
	#[serde(rename = "activeThemeUrls", default, deserialize_with = "lenient_seq")]
	pub active_theme_urls: Vec<String>,
}

/// Desired theme set carried by `themes`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemesInfo {
	/// Stylesheet urls the host wants active, in order.
	#[serde(default)]
	pub themes: Vec<String>,
}

/// Stream payload carrying the active document.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextItemInfo {
	/// The streamed item.
	pub item: crate::item::DocumentItem,
}

/// An inbound envelope decoded per action.
///
/// This is the closed routing union: registration and theme messages
/// match on their action, everything else routes by reply reference.
#[derive(Debug, Clone)]
pub enum HostMessage {
	/// Session establishment (or re-establishment) with capabilities.
	Registered {
		/// Session token for subsequent outbound messages.
		session_key: SessionKey,
		/// Component data blob stored host-side, when sent.
		component_data: Option<Map<String, Value>>,
		/// Reported capabilities.
		info: RegistrationInfo,
	},
	/// New desired theme set.
	Themes(Vec<String>),
	/// Reply to an earlier outbound request.
	Reply {
		/// Correlation id of the request this answers.
		original: MessageId,
		/// Reply payload.
		data: Value,
	},
}

impl HostMessage {
	/// Decodes an envelope into the routing union.
	///
	/// Returns `None` for envelopes that cannot be routed: a registration
	/// without a session key, a theme message without a payload object,
	/// or any other action without a reply reference. Callers drop those
	/// silently.
	#[must_use]
	pub fn classify(envelope: Envelope) -> Option<Self> {
		match envelope.action {
			Action::ComponentRegistered => {
				let session_key = envelope.session_key?;
				let info = serde_json::from_value(envelope.data).unwrap_or_default();
				Some(Self::Registered {
					session_key,
					component_data: envelope.component_data,
					info,
				})
			}
			Action::Themes => {
				let info: ThemesInfo = serde_json::from_value(envelope.data).ok()?;
				Some(Self::Themes(info.themes))
			}
			_ => {
				let original = envelope.original?;
				Some(Self::Reply {
					original: original.message_id,
					data: envelope.data,
				})
			}
		}
	}
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: serde::Deserializer<'de>,
	T: serde::de::DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	Ok(serde_json::from_value(value).ok())
}

fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: serde::Deserializer<'de>,
	T: serde::de::DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	Ok(serde_json::from_value(value).unwrap_or_default())
}
