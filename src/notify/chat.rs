//! Webhook chat notifier.
//!
//! Posts the event as a `{"text": ...}` payload to every webhook listed in
//! `CHAT_WEBHOOK_URLS` (comma-separated). One attempt per channel; results
//! are accounted per channel and the send only errors when every channel
//! failed.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;

use super::{NotificationEvent, Notifier};

pub struct ChatNotifier {
    webhooks: Vec<String>,
    client: Client,
    timeout: Duration,
}

impl ChatNotifier {
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var("CHAT_WEBHOOK_URLS").ok()?;
        let webhooks: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if webhooks.is_empty() {
            return None;
        }
        Some(Self::new(webhooks))
    }

    pub fn new(webhooks: Vec<String>) -> Self {
        Self {
            webhooks,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn post(&self, url: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "text": text });
        self.client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for ChatNotifier {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        let text = format!("{}\n{}", ev.subject(), ev.body());

        let mut ok = 0usize;
        for url in &self.webhooks {
            match self.post(url, &text).await {
                Ok(()) => ok += 1,
                Err(e) => tracing::warn!(error = %e, "chat webhook post failed"),
            }
        }
        tracing::info!(ok, total = self.webhooks.len(), "chat dispatch result");

        if ok == 0 {
            return Err(anyhow!("all {} chat webhooks failed", self.webhooks.len()));
        }
        Ok(())
    }
}
