//! # Reminders Feature
//!
//! Periodic delivery of due medication reminders across timezones.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Timezone-aware due matching with store-backed send dedup
//! - 1.0.0: Initial fixed-interval scheduler

pub mod scheduler;

pub use scheduler::{is_due, ReminderScheduler};
