//! HTTP notifier
//!
//! Posts a JSON `sendMessage` request to the transport's HTTP API. The
//! client carries a hard timeout so a hung endpoint cannot stall the
//! scheduler's tick.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{Notifier, NotifyError};

pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(HttpNotifier {
            client,
            endpoint: format!("{base_url}/bot{token}/sendMessage"),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": recipient_id,
            "text": text,
        });

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) if response.status().is_client_error() => Err(NotifyError::Permanent(
                format!("HTTP {}", response.status()),
            )),
            Ok(response) => Err(NotifyError::Transient(format!(
                "HTTP {}",
                response.status()
            ))),
            Err(e) if e.is_timeout() => Err(NotifyError::Transient("request timed out".into())),
            Err(e) if e.is_connect() => Err(NotifyError::Transient(format!("connect: {e}"))),
            Err(e) => Err(NotifyError::Transient(e.to_string())),
        }
    }
}
