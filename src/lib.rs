// Core layer - shared types and configuration
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure
pub mod database;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items
pub use features::{
    // Authorization
    AccessPolicy, AllowList, OpenAccess,
    // Dialog
    DialogEngine, DialogState, InboundMessage, Intent, Reply, SessionStore,
    // Notification
    HttpNotifier, Notifier, NotifyError,
    // Reminders
    ReminderScheduler,
};
