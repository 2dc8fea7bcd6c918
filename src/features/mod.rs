// Features layer - one directory per feature
pub mod auth;
pub mod dialog;
pub mod notify;
pub mod reminders;

// Re-export feature items
pub use auth::{AccessPolicy, AllowList, OpenAccess};
pub use dialog::{DialogEngine, DialogState, InboundMessage, Intent, Reply, SessionStore};
pub use notify::{HttpNotifier, Notifier, NotifyError};
pub use reminders::ReminderScheduler;
