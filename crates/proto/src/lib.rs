//! Wire types for the sill component protocol.
//!
//! An embedded component and its host application talk across a frame
//! boundary whose only primitive is an asynchronous, origin-scoped
//! message that carries either a string or a structured object. This
//! crate defines the envelope that crosses that boundary, the action
//! vocabulary, and the per-action payloads, plus the document item the
//! host streams to the component.
//!
//! Field names follow the wire (camelCase where the protocol says so);
//! Rust-side names stay snake_case via serde renames.

#![warn(missing_docs)]

pub mod item;
pub mod types;

pub use item::{DocumentContent, DocumentItem, HOST_APP_DOMAIN};
pub use types::{
	Action, ApiTag, ContextItemInfo, Envelope, Environment, HostMessage, MessageId,
	RegistrationInfo, ReplyRef, SessionKey, ThemesInfo,
};
