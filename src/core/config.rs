//! Startup configuration
//!
//! All configuration comes from environment variables (with a `.env` file
//! loaded by the binary). A missing `BOT_TOKEN` is fatal: the process must
//! not start serving without a way to deliver messages.

use anyhow::{anyhow, Result};
use log::error;
use serde::Deserialize;
use std::env;

/// Runtime configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport access token (required)
    pub bot_token: String,
    /// Base URL the HTTP notifier posts to
    pub notify_base_url: String,
    /// Path of the SQLite database file
    pub database_path: String,
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    /// Allow-list file; when unset, access is open
    pub allowed_users_path: Option<String>,
    /// Optional JSON file with timezone choices for the dialog
    pub timezones_path: Option<String>,
    /// Seconds between delivery-engine ticks
    pub tick_interval_secs: u64,
    /// Minutes during which a second send of the same reminder is suppressed
    pub dedup_window_minutes: i64,
    /// Upper bound on a single notifier call
    pub send_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN")
            .map_err(|_| anyhow!("BOT_TOKEN is not set; the bot cannot start without it"))?;

        Ok(Config {
            bot_token,
            notify_base_url: env_or("NOTIFY_BASE_URL", "https://api.telegram.org"),
            database_path: env_or("DATABASE_PATH", "data/database.db"),
            log_level: env_or("LOG_LEVEL", "info"),
            allowed_users_path: env::var("ALLOWED_USERS_PATH").ok(),
            timezones_path: env::var("TIMEZONES_PATH").ok(),
            tick_interval_secs: env_num("TICK_INTERVAL_SECS", 60),
            dedup_window_minutes: env_num("DEDUP_WINDOW_MINUTES", 2),
            send_timeout_secs: env_num("SEND_TIMEOUT_SECS", 30),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// One selectable timezone in the dialog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimezoneChoice {
    /// Caption shown to the user, e.g. "Kyiv (UTC+2/+3)"
    pub label: String,
    /// IANA zone name, e.g. "Europe/Kyiv"
    pub tz: String,
}

/// Load the timezone choice list from an optional JSON file.
///
/// Falls back to the built-in list on a missing path or a parse error,
/// so a broken config file never leaves the dialog without choices.
pub fn load_timezone_choices(path: Option<&str>) -> Vec<TimezoneChoice> {
    let Some(path) = path else {
        return default_timezone_choices();
    };

    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(choices) => choices,
            Err(e) => {
                error!("Failed to parse timezone list {path}: {e}");
                default_timezone_choices()
            }
        },
        Err(e) => {
            error!("Failed to read timezone list {path}: {e}");
            default_timezone_choices()
        }
    }
}

fn default_timezone_choices() -> Vec<TimezoneChoice> {
    [
        ("Vienna (UTC+1/+2)", "Europe/Vienna"),
        ("Kyiv (UTC+2/+3)", "Europe/Kyiv"),
        ("Kharkiv (UTC+2/+3)", "Europe/Kyiv"),
        ("Seattle (UTC-8/-7)", "America/Los_Angeles"),
        ("Starobilsk (UTC+3)", "Europe/Moscow"),
    ]
    .into_iter()
    .map(|(label, tz)| TimezoneChoice {
        label: label.to_string(),
        tz: tz.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timezone_choices_are_valid_iana_names() {
        for choice in default_timezone_choices() {
            assert!(
                choice.tz.parse::<chrono_tz::Tz>().is_ok(),
                "invalid zone {}",
                choice.tz
            );
        }
    }

    #[test]
    fn test_load_timezone_choices_missing_file_falls_back() {
        let choices = load_timezone_choices(Some("/nonexistent/timezones.json"));
        assert_eq!(choices, default_timezone_choices());
    }

    #[test]
    fn test_load_timezone_choices_none_uses_defaults() {
        assert!(!load_timezone_choices(None).is_empty());
    }
}
