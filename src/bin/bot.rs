use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use medbot::core::config::load_timezone_choices;
use medbot::core::Config;
use medbot::database::Database;
use medbot::features::auth::{AccessPolicy, AllowList, OpenAccess};
use medbot::features::dialog::{DialogEngine, InboundMessage, SessionStore};
use medbot::features::notify::{HttpNotifier, Notifier};
use medbot::features::reminders::ReminderScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Medicine Reminder Bot...");

    let database = Database::new(&config.database_path).await?;

    let access: Arc<dyn AccessPolicy> = match &config.allowed_users_path {
        Some(path) => {
            info!("🔐 Access restricted to the allow-list at {path}");
            Arc::new(AllowList::new(path))
        }
        None => {
            warn!("ALLOWED_USERS_PATH not set - access is open to everyone");
            Arc::new(OpenAccess)
        }
    };

    let timezones = load_timezone_choices(config.timezones_path.as_deref());
    let engine = DialogEngine::new(
        database.clone(),
        SessionStore::new(),
        access,
        timezones,
    );

    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(
        &config.notify_base_url,
        &config.bot_token,
        Duration::from_secs(config.send_timeout_secs),
    )?);

    // Single scheduler instance: the dedup check is a time-window
    // heuristic, not a cross-process lock
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = ReminderScheduler::new(database, notifier).with_timing(
        Duration::from_secs(config.tick_interval_secs),
        config.dedup_window_minutes,
        Duration::from_secs(config.send_timeout_secs),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Bot configured successfully. Reading messages on stdin (reference transport)...");

    // Reference line-based transport: each stdin line is one message from
    // the local operator conversation. Real deployments replace this loop
    // with a chat-transport adapter speaking the same InboundMessage/Reply
    // contract.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(text)) => {
                    let msg = InboundMessage {
                        conversation_id: "local".to_string(),
                        sender_id: "local".to_string(),
                        sender_handle: None,
                        text,
                    };
                    let reply = engine.handle_message(&msg).await;
                    println!("{}", reply.text);
                    if let Some(options) = reply.options {
                        println!("  [{}]", options.join(" | "));
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {e}");
    }
    info!("Bot stopped");
    Ok(())
}
