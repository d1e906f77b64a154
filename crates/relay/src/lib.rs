//! Relay between an embedded component and its host application.
//!
//! An embedded editor runs inside a sandboxed frame. The only channel
//! to the application embedding it is an asynchronous, origin-scoped
//! message primitive carrying strings or structured objects. This crate
//! mediates that boundary so the component never touches raw messages:
//!
//! * handshake and origin lock ([`session`])
//! * outbound queueing and request/reply correlation ([`correlate`])
//! * save coalescing with forced flush on document switch ([`save`])
//! * theme stylesheet reconciliation ([`themes`])
//! * observer fan-out for document updates ([`Relay::subscribe`])
//!
//! The embedding glue implements three small traits and forwards raw
//! events: [`HostPort`] posts outbound payloads, [`ThemeSink`] owns
//! stylesheet elements, [`Scheduler`] supplies cancellable timers, and
//! every inbound event goes to [`Relay::handle_event`]. Everything else
//! is driven through [`Relay`].

#![warn(missing_docs)]

pub mod config;
pub mod correlate;
pub mod error;
pub mod relay;
pub mod save;
pub mod schedule;
pub mod session;
pub mod themes;
pub mod transport;

pub use sill_proto as proto;
pub use sill_proto::Environment;

pub use config::{DEFAULT_COALESCE_DELAY, PreviewFn, RelayConfig};
pub use correlate::{Reply, ReplyCallback};
pub use error::{RelayError, Result};
pub use relay::{Observer, ObserverId, Relay, ThemesChangedFn};
pub use save::{PREVIEW_LIMIT, SaveCallback, preview_text};
pub use schedule::{ManualScheduler, ScheduleHandle, ScheduledAction, Scheduler, TokioScheduler};
pub use session::{Admission, PeerSession, SessionStage};
pub use themes::{ThemeOp, ThemeReconciler, ThemeSink, element_id};
pub use transport::{FrameEvent, FramePayload, HostPort, decode_payload};
