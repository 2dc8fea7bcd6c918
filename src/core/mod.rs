//! # Core Module
//!
//! Configuration and shared startup types for the medicine bot.
//!
//! - **Version**: 1.0.0
//! - **Since**: 2.0.0
//! - **Toggleable**: false

pub mod config;

// Re-export commonly used items
pub use config::{load_timezone_choices, Config, TimezoneChoice};
