//! # Dialog Feature
//!
//! The guided conversation state machine. Every inbound message is
//! mapped to a structured intent, dispatched against the explicit
//! per-conversation state, and answered with a prompt plus an option
//! set for the transport to render as quick-reply buttons.
//!
//! Side effects on the persistent store happen only on save/confirm
//! transitions; invalid input re-prompts without mutating anything.
//!
//! - **Version**: 1.1.0
//! - **Since**: 2.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Raw IANA names accepted in the timezone steps
//! - 1.0.0: Initial release with add/list/delete/timezone flows

pub mod engine;
pub mod format;
pub mod intent;
pub mod state;
pub mod validate;

pub use engine::{DialogEngine, InboundMessage, Reply};
pub use intent::Intent;
pub use state::{DialogState, SessionDraft, SessionStore};
