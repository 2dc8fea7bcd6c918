//! # Notification Feature
//!
//! The delivery seam between the reminder scheduler and the chat
//! transport. Failures are classified as transient (worth noting, the
//! next occurrence will try again) or permanent (the recipient is
//! unreachable); the classification only affects logging - there is no
//! differentiated retry.
//!
//! - **Version**: 1.0.0
//! - **Since**: 2.0.0
//! - **Toggleable**: false

pub mod http;

pub use http::HttpNotifier;

use async_trait::async_trait;
use std::fmt;

/// A delivery failure, classified for logging
#[derive(Debug)]
pub enum NotifyError {
    /// Timeout, connection error, 5xx - may succeed next occurrence
    Transient(String),
    /// Recipient unreachable or rejected - operator attention needed
    Permanent(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Transient(reason) => write!(f, "transient: {reason}"),
            NotifyError::Permanent(reason) => write!(f, "permanent: {reason}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Delivers one text message to one recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<(), NotifyError>;
}
