//! The document item streamed from the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application domain key under which the host stores item status flags
/// (locked, archived, pinned, trashed, starred).
pub const HOST_APP_DOMAIN: &str = "org.sill.host";

/// The active document as the host streams it.
///
/// Only the fields the relay acts on are modeled; everything else the
/// host attaches is preserved in `extra` so saves round-trip unknown
/// fields unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
	/// Stable identity of the underlying item.
	pub uuid: String,
	/// Item kind as reported by the host.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content_type: Option<String>,
	/// Editable content body.
	#[serde(default)]
	pub content: DocumentContent,
	/// True when only bookkeeping changed and the content may be stale.
	/// Such updates must not clobber local edits.
	#[serde(rename = "isMetadataUpdate", default, skip_serializing_if = "is_false")]
	pub is_metadata_update: bool,
	/// Host-side creation timestamp, passed through opaquely.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<Value>,
	/// Host-side update timestamp, passed through opaquely.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<Value>,
	/// Unmodeled item fields, preserved for round-tripping.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

fn is_false(flag: &bool) -> bool {
	!*flag
}

/// Content body of a [`DocumentItem`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
	/// Document text.
	#[serde(default)]
	pub text: String,
	/// Document title.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// Identifier of the editor bound to this document; metadata reads
	/// and writes key on it.
	#[serde(rename = "editorIdentifier", default, skip_serializing_if = "Option::is_none")]
	pub editor_identifier: Option<String>,
	/// Per-domain application metadata.
	#[serde(rename = "appData", default, skip_serializing_if = "Map::is_empty")]
	pub app_data: Map<String, Value>,
	/// Plain-text preview shown in host lists; derived before a save.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview_plain: Option<String>,
	/// Rich preview shown in host lists.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview_html: Option<String>,
	/// Unmodeled content fields, preserved for round-tripping.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl DocumentItem {
	/// Copy prepared for the wire: ownership links (`parent`, `children`)
	/// are nulled so no object-graph structure leaks into the payload.
	#[must_use]
	pub fn wire_copy(&self) -> Self {
		let mut copy = self.clone();
		copy.extra.insert("parent".to_string(), Value::Null);
		copy.extra.insert("children".to_string(), Value::Null);
		copy
	}

	/// Reads a boolean status flag from the host's metadata domain.
	/// Absent domains or flags read as `false`.
	#[must_use]
	pub fn host_flag(&self, flag: &str) -> bool {
		self.content
			.app_data
			.get(HOST_APP_DOMAIN)
			.and_then(|domain| domain.get(flag))
			.and_then(Value::as_bool)
			.unwrap_or(false)
	}

	/// Metadata stored under the bound editor's identifier; `null` when
	/// nothing was recorded. A document without an editor identifier
	/// keys its metadata under the empty string.
	#[must_use]
	pub fn editor_meta(&self) -> Value {
		let key = self.content.editor_identifier.as_deref().unwrap_or_default();
		self.content.app_data.get(key).cloned().unwrap_or(Value::Null)
	}

	/// Replaces the metadata stored under the bound editor's identifier.
	pub fn set_editor_meta(&mut self, meta: Value) {
		let key = self.content.editor_identifier.clone().unwrap_or_default();
		self.content.app_data.insert(key, meta);
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn item(value: Value) -> DocumentItem {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn test_wire_copy_nulls_ownership_links() {
		let original = item(json!({
			"uuid": "doc-1",
			"content": { "text": "hello" },
			"parent": { "uuid": "folder-1" },
			"children": [{ "uuid": "doc-2" }]
		}));
		let wire = serde_json::to_value(original.wire_copy()).unwrap();
		assert_eq!(wire["parent"], Value::Null);
		assert_eq!(wire["children"], Value::Null);
		// The in-memory item keeps its links.
		assert!(original.extra["parent"].is_object());
	}

	#[test]
	fn test_host_flags_default_false() {
		let plain = item(json!({ "uuid": "doc-1" }));
		assert!(!plain.host_flag("locked"));

		let flagged = item(json!({
			"uuid": "doc-1",
			"content": {
				"appData": { HOST_APP_DOMAIN: { "locked": true, "pinned": false } }
			}
		}));
		assert!(flagged.host_flag("locked"));
		assert!(!flagged.host_flag("pinned"));
		assert!(!flagged.host_flag("starred"));
	}

	#[test]
	fn test_editor_meta_keys_on_identifier() {
		let mut doc = item(json!({
			"uuid": "doc-1",
			"content": {
				"editorIdentifier": "org.example.editor",
				"appData": { "org.example.editor": { "cursor": 4 } }
			}
		}));
		assert_eq!(doc.editor_meta(), json!({ "cursor": 4 }));

		doc.set_editor_meta(json!({ "cursor": 9 }));
		assert_eq!(doc.editor_meta(), json!({ "cursor": 9 }));
	}

	#[test]
	fn test_editor_meta_without_identifier_uses_empty_key() {
		let mut doc = item(json!({ "uuid": "doc-1" }));
		assert_eq!(doc.editor_meta(), Value::Null);

		doc.set_editor_meta(json!(["a"]));
		assert_eq!(doc.content.app_data.get(""), Some(&json!(["a"])));
		assert_eq!(doc.editor_meta(), json!(["a"]));
	}

	#[test]
	fn test_unknown_fields_round_trip() {
		let wire = json!({
			"uuid": "doc-1",
			"content_type": "Note",
			"content": {
				"text": "body",
				"references": [{ "uuid": "doc-2" }]
			},
			"dirty": true
		});
		let doc = item(wire.clone());
		assert_eq!(doc.extra["dirty"], json!(true));
		assert_eq!(doc.content.extra["references"], json!([{ "uuid": "doc-2" }]));
		assert_eq!(serde_json::to_value(&doc).unwrap(), wire);
	}
}
