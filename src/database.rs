//! # SQLite persistence layer
//!
//! Durable storage for users, medicines, reminders, and the delivery log.
//! `Database` is cheap to clone and is shared by the dialog engine and the
//! reminder scheduler; all access is serialized behind one async mutex.
//!
//! Every operation fails closed: on an SQLite error it logs the failure
//! with the operation name and identifiers and returns `None`/`false`/empty,
//! never an error the caller has to unwrap. Foreign keys are enforced, so
//! deleting a medicine removes its reminders and their delivery-log rows in
//! one statement.

use anyhow::{Context as _, Result};
use log::{error, info};
use sqlite::{Connection, State};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        username TEXT,
        timezone TEXT NOT NULL DEFAULT 'Europe/Kyiv',
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS medicines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users (user_id) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS reminders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        medicine_id INTEGER NOT NULL,
        time TEXT NOT NULL,
        dosage TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (medicine_id) REFERENCES medicines (id) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS delivery_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reminder_id INTEGER NOT NULL,
        sent_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (reminder_id) REFERENCES reminders (id) ON DELETE CASCADE
    );
";

/// A registered user
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub timezone: String,
    pub created_at: String,
}

/// One reminder row as seen from the dialog side
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderEntry {
    pub id: i64,
    pub time: String,
    pub dosage: String,
    pub active: bool,
}

/// A medicine with its reminders, grouped for display and deletion flows
#[derive(Debug, Clone)]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    pub reminders: Vec<ReminderEntry>,
}

impl Medicine {
    /// Reminders that can still fire, sorted by time
    pub fn active_reminders(&self) -> Vec<&ReminderEntry> {
        self.reminders.iter().filter(|r| r.active).collect()
    }
}

/// One active reminder joined with its owner, as the scheduler consumes it
#[derive(Debug, Clone)]
pub struct ActiveReminder {
    pub reminder_id: i64,
    pub time: String,
    pub dosage: String,
    pub medicine_name: String,
    pub user_id: String,
    pub timezone: String,
}

/// One row of the append-only delivery log
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub id: i64,
    pub sent_at: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    ///
    /// `:memory:` is accepted for tests. This is the one fallible entry
    /// point of the store: a database that cannot be opened is a fatal
    /// configuration problem.
    pub async fn new(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create directory for {path}"))?;
                }
            }
        }

        let conn =
            sqlite::open(path).with_context(|| format!("failed to open database at {path}"))?;
        conn.execute("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys")?;
        conn.execute(SCHEMA).context("failed to create schema")?;

        info!("Database initialized at {path}");
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Look up a user by id
    pub async fn get_user(&self, user_id: &str) -> Option<User> {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<Option<User>> {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, timezone, created_at FROM users WHERE user_id = ?",
            )?;
            stmt.bind((1, user_id))?;
            if let State::Row = stmt.next()? {
                Ok(Some(User {
                    id: stmt.read::<String, _>("user_id")?,
                    username: stmt.read::<Option<String>, _>("username")?,
                    timezone: stmt.read::<String, _>("timezone")?,
                    created_at: stmt.read::<String, _>("created_at")?,
                }))
            } else {
                Ok(None)
            }
        })();

        match result {
            Ok(user) => user,
            Err(e) => {
                error!("get_user failed for {user_id}: {e}");
                None
            }
        }
    }

    /// Insert or update a user, keeping the original creation timestamp
    pub async fn upsert_user(&self, user_id: &str, username: Option<&str>, timezone: &str) -> bool {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<()> {
            let mut stmt = conn.prepare(
                "INSERT INTO users (user_id, username, timezone) VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET username = excluded.username,
                                                    timezone = excluded.timezone",
            )?;
            stmt.bind((1, user_id))?;
            stmt.bind((2, username))?;
            stmt.bind((3, timezone))?;
            stmt.next()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!("User {user_id} added/updated (timezone {timezone})");
                true
            }
            Err(e) => {
                error!("upsert_user failed for {user_id}: {e}");
                false
            }
        }
    }

    /// Create a medicine and return its id
    pub async fn add_medicine(&self, user_id: &str, name: &str) -> Option<i64> {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<i64> {
            let mut stmt = conn.prepare("INSERT INTO medicines (user_id, name) VALUES (?, ?)")?;
            stmt.bind((1, user_id))?;
            stmt.bind((2, name))?;
            stmt.next()?;

            let mut id_stmt = conn.prepare("SELECT last_insert_rowid()")?;
            id_stmt.next()?;
            id_stmt.read::<i64, _>(0)
        })();

        match result {
            Ok(id) => {
                info!("Medicine '{name}' added for user {user_id}");
                Some(id)
            }
            Err(e) => {
                error!("add_medicine failed for user {user_id}: {e}");
                None
            }
        }
    }

    /// Create an active reminder for a medicine
    pub async fn add_reminder(&self, medicine_id: i64, time: &str, dosage: &str) -> bool {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<()> {
            let mut stmt =
                conn.prepare("INSERT INTO reminders (medicine_id, time, dosage) VALUES (?, ?, ?)")?;
            stmt.bind((1, medicine_id))?;
            stmt.bind((2, time))?;
            stmt.bind((3, dosage))?;
            stmt.next()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!("Reminder added for medicine {medicine_id} at {time}");
                true
            }
            Err(e) => {
                error!("add_reminder failed for medicine {medicine_id}: {e}");
                false
            }
        }
    }

    /// All medicines of a user with their reminders, grouped per medicine
    pub async fn list_medicines(&self, user_id: &str) -> Vec<Medicine> {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<Vec<Medicine>> {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.name, r.id, r.time, r.dosage, r.active
                 FROM medicines m
                 LEFT JOIN reminders r ON m.id = r.medicine_id
                 WHERE m.user_id = ?
                 ORDER BY m.name, r.time",
            )?;
            stmt.bind((1, user_id))?;

            let mut medicines: Vec<Medicine> = Vec::new();
            while let State::Row = stmt.next()? {
                let medicine_id = stmt.read::<i64, _>(0)?;
                if medicines.last().map(|m| m.id) != Some(medicine_id) {
                    medicines.push(Medicine {
                        id: medicine_id,
                        name: stmt.read::<String, _>(1)?,
                        reminders: Vec::new(),
                    });
                }
                if let Some(reminder_id) = stmt.read::<Option<i64>, _>(2)? {
                    medicines.last_mut().unwrap().reminders.push(ReminderEntry {
                        id: reminder_id,
                        time: stmt.read::<String, _>(3)?,
                        dosage: stmt.read::<String, _>(4)?,
                        active: stmt.read::<i64, _>(5)? != 0,
                    });
                }
            }
            Ok(medicines)
        })();

        match result {
            Ok(medicines) => medicines,
            Err(e) => {
                error!("list_medicines failed for user {user_id}: {e}");
                Vec::new()
            }
        }
    }

    /// Delete a medicine (and, via cascade, its reminders and delivery log).
    /// The ownership check makes a forged id from another user a no-op.
    pub async fn delete_medicine(&self, medicine_id: i64, user_id: &str) -> bool {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<bool> {
            let mut stmt = conn.prepare("DELETE FROM medicines WHERE id = ? AND user_id = ?")?;
            stmt.bind((1, medicine_id))?;
            stmt.bind((2, user_id))?;
            stmt.next()?;
            Ok(conn.change_count() > 0)
        })();

        match result {
            Ok(deleted) => {
                if deleted {
                    info!("Medicine {medicine_id} deleted for user {user_id}");
                }
                deleted
            }
            Err(e) => {
                error!("delete_medicine failed for {medicine_id}: {e}");
                false
            }
        }
    }

    /// Delete a single reminder, checking ownership through its medicine
    pub async fn delete_reminder(&self, reminder_id: i64, user_id: &str) -> bool {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<bool> {
            let mut stmt = conn.prepare(
                "DELETE FROM reminders
                 WHERE id = ? AND medicine_id IN (SELECT id FROM medicines WHERE user_id = ?)",
            )?;
            stmt.bind((1, reminder_id))?;
            stmt.bind((2, user_id))?;
            stmt.next()?;
            Ok(conn.change_count() > 0)
        })();

        match result {
            Ok(deleted) => {
                if deleted {
                    info!("Reminder {reminder_id} deleted for user {user_id}");
                }
                deleted
            }
            Err(e) => {
                error!("delete_reminder failed for {reminder_id}: {e}");
                false
            }
        }
    }

    /// Delete every medicine of a user. Returns the number of medicines removed.
    pub async fn delete_all_medicines(&self, user_id: &str) -> i64 {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<i64> {
            let mut count_stmt =
                conn.prepare("SELECT COUNT(*) FROM medicines WHERE user_id = ?")?;
            count_stmt.bind((1, user_id))?;
            count_stmt.next()?;
            let count = count_stmt.read::<i64, _>(0)?;

            let mut stmt = conn.prepare("DELETE FROM medicines WHERE user_id = ?")?;
            stmt.bind((1, user_id))?;
            stmt.next()?;
            Ok(count)
        })();

        match result {
            Ok(count) => {
                info!("All {count} medicines deleted for user {user_id}");
                count
            }
            Err(e) => {
                error!("delete_all_medicines failed for user {user_id}: {e}");
                0
            }
        }
    }

    /// All active reminders joined with medicine name and owner timezone,
    /// the working set of one scheduler tick
    pub async fn list_active_reminders_with_owner(&self) -> Vec<ActiveReminder> {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<Vec<ActiveReminder>> {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.time, r.dosage, m.name, u.user_id, u.timezone
                 FROM reminders r
                 JOIN medicines m ON r.medicine_id = m.id
                 JOIN users u ON m.user_id = u.user_id
                 WHERE r.active = 1
                 ORDER BY r.time",
            )?;

            let mut reminders = Vec::new();
            while let State::Row = stmt.next()? {
                reminders.push(ActiveReminder {
                    reminder_id: stmt.read::<i64, _>(0)?,
                    time: stmt.read::<String, _>(1)?,
                    dosage: stmt.read::<String, _>(2)?,
                    medicine_name: stmt.read::<String, _>(3)?,
                    user_id: stmt.read::<String, _>(4)?,
                    timezone: stmt.read::<String, _>(5)?,
                });
            }
            Ok(reminders)
        })();

        match result {
            Ok(reminders) => reminders,
            Err(e) => {
                error!("list_active_reminders_with_owner failed: {e}");
                Vec::new()
            }
        }
    }

    /// Append a delivery-log row for a sent reminder
    pub async fn record_delivery(&self, reminder_id: i64) -> bool {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<()> {
            let mut stmt = conn.prepare("INSERT INTO delivery_log (reminder_id) VALUES (?)")?;
            stmt.bind((1, reminder_id))?;
            stmt.next()?;
            Ok(())
        })();

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("record_delivery failed for reminder {reminder_id}: {e}");
                false
            }
        }
    }

    /// Delivery-log rows for a reminder within the last `window_minutes`.
    /// A non-empty result means this occurrence was already sent.
    pub async fn recent_deliveries(
        &self,
        reminder_id: i64,
        window_minutes: i64,
    ) -> Vec<DeliveryRecord> {
        let conn = self.conn.lock().await;
        let result = (|| -> sqlite::Result<Vec<DeliveryRecord>> {
            let mut stmt = conn.prepare(
                "SELECT id, sent_at FROM delivery_log
                 WHERE reminder_id = ? AND datetime(sent_at) > datetime('now', ?)
                 ORDER BY sent_at DESC",
            )?;
            stmt.bind((1, reminder_id))?;
            stmt.bind((2, format!("-{window_minutes} minutes").as_str()))?;

            let mut records = Vec::new();
            while let State::Row = stmt.next()? {
                records.push(DeliveryRecord {
                    id: stmt.read::<i64, _>(0)?,
                    sent_at: stmt.read::<String, _>(1)?,
                });
            }
            Ok(records)
        })();

        match result {
            Ok(records) => records,
            Err(e) => {
                error!("recent_deliveries failed for reminder {reminder_id}: {e}");
                Vec::new()
            }
        }
    }
}
