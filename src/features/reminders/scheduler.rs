//! Reminder scheduler
//!
//! Every tick takes one reference instant, converts it into each owner's
//! local timezone and compares the formatted `HH:MM` against the stored
//! time-of-day. Exact-minute equality means a reminder fires at most once
//! per day per minute boundary; a tick delayed past the due minute skips
//! that occurrence for the day.
//!
//! The dedup check is a time-window lookup over the delivery log, not a
//! transactional mutex: run exactly one scheduler instance. A second
//! concurrent instance could pass the check and double-send.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::database::Database;
use crate::features::dialog::format::format_reminder_message;
use crate::features::notify::{Notifier, NotifyError};

pub struct ReminderScheduler {
    database: Database,
    notifier: Arc<dyn Notifier>,
    tick_interval: Duration,
    dedup_window_minutes: i64,
    send_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(database: Database, notifier: Arc<dyn Notifier>) -> Self {
        ReminderScheduler {
            database,
            notifier,
            tick_interval: Duration::from_secs(60),
            dedup_window_minutes: 2,
            send_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timing(
        mut self,
        tick_interval: Duration,
        dedup_window_minutes: i64,
        send_timeout: Duration,
    ) -> Self {
        self.tick_interval = tick_interval;
        self.dedup_window_minutes = dedup_window_minutes;
        self.send_timeout = send_timeout;
        self
    }

    /// Run the tick loop until the shutdown channel fires. An in-flight
    /// scan finishes (or its sends time out) before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "⏰ Reminder scheduler started (tick every {:?}, dedup window {} min)",
            self.tick_interval, self.dedup_window_minutes
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    info!("⏰ Reminder scheduler stopping");
                    break;
                }
            }
        }
    }

    /// One scan over the active reminders at the given reference instant.
    /// A single failed delivery never aborts the rest of the due-set.
    pub async fn scan(&self, now: DateTime<Utc>) {
        let reminders = self.database.list_active_reminders_with_owner().await;
        debug!("Scanning {} active reminders", reminders.len());

        for reminder in reminders {
            if !is_due(now, &reminder.timezone, &reminder.time) {
                continue;
            }

            let recent = self
                .database
                .recent_deliveries(reminder.reminder_id, self.dedup_window_minutes)
                .await;
            if !recent.is_empty() {
                debug!(
                    "Reminder {} already sent recently, skipping",
                    reminder.reminder_id
                );
                continue;
            }

            let text = format_reminder_message(
                &reminder.medicine_name,
                &reminder.dosage,
                &reminder.time,
            );
            info!(
                "Sending reminder {} to user {} for {} at {}",
                reminder.reminder_id, reminder.user_id, reminder.medicine_name, reminder.time
            );

            match timeout(
                self.send_timeout,
                self.notifier.send(&reminder.user_id, &text),
            )
            .await
            {
                Ok(Ok(())) => {
                    if !self.database.record_delivery(reminder.reminder_id).await {
                        error!(
                            "Delivered reminder {} but failed to record it - \
                             the dedup window is the only duplicate guard now",
                            reminder.reminder_id
                        );
                    }
                    info!(
                        "✅ Reminder {} delivered to user {}",
                        reminder.reminder_id, reminder.user_id
                    );
                }
                Ok(Err(NotifyError::Transient(reason))) => {
                    warn!(
                        "Transient delivery failure for reminder {} to user {}: {reason}",
                        reminder.reminder_id, reminder.user_id
                    );
                }
                Ok(Err(NotifyError::Permanent(reason))) => {
                    error!(
                        "Permanent delivery failure for reminder {} to user {}: {reason}",
                        reminder.reminder_id, reminder.user_id
                    );
                }
                Err(_) => {
                    warn!(
                        "Delivery of reminder {} timed out after {:?}",
                        reminder.reminder_id, self.send_timeout
                    );
                }
            }
        }
    }
}

/// Is a reminder with `time` (canonical `HH:MM`) due at `now` for an owner
/// in `timezone`? Unknown zone names are logged and never due.
pub fn is_due(now: DateTime<Utc>, timezone: &str, time: &str) -> bool {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            error!("Unknown timezone '{timezone}', skipping reminder");
            return false;
        }
    };
    now.with_timezone(&tz).format("%H:%M").to_string() == time
}
