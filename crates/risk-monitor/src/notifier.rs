//! Telegram notifier.
//!
//! `emit` only enqueues; a background task renders and posts each event so a
//! slow or failing Telegram API never holds up a risk check.

use chrono::{FixedOffset, Utc};
use guard_core::config::TelegramConfig;
use guard_core::{Notifier, RiskEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::MessageRenderer;

/// Queued events beyond this are dropped with a warning.
const QUEUE_CAPACITY: usize = 256;

/// Sends risk events to a Telegram chat.
pub struct TelegramNotifier {
    tx: mpsc::Sender<RiskEvent>,
}

/// Owns the delivery task; see [`NotifierWorker::finish`].
pub struct NotifierWorker {
    handle: JoinHandle<()>,
}

impl TelegramNotifier {
    /// Start the delivery task on the current runtime.
    pub fn spawn(
        config: TelegramConfig,
        renderer: MessageRenderer,
        timeout: Duration,
    ) -> anyhow::Result<(Self, NotifierWorker)> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let sender = TelegramSender {
            http_client,
            url: format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token),
            chat_id: config.chat_id,
        };
        let handle = tokio::spawn(deliver(rx, sender, renderer));
        Ok((Self { tx }, NotifierWorker { handle }))
    }
}

impl Notifier for TelegramNotifier {
    fn emit(&self, event: RiskEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let kind = match &e {
                mpsc::error::TrySendError::Full(event) | mpsc::error::TrySendError::Closed(event) => {
                    event.kind()
                }
            };
            warn!(kind = kind, error = %e, "Dropped Telegram notification");
        }
    }
}

impl NotifierWorker {
    /// Wait for queued messages to go out once every [`TelegramNotifier`] has
    /// been dropped. Gives up after `grace`.
    pub async fn finish(self, grace: Duration) {
        if tokio::time::timeout(grace, self.handle).await.is_err() {
            warn!("Telegram queue not drained before shutdown");
        }
    }
}

struct TelegramSender {
    http_client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramSender {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML"
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API returned {}: {}", status, body);
        }
        Ok(())
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<RiskEvent>,
    sender: TelegramSender,
    renderer: MessageRenderer,
) {
    while let Some(event) = rx.recv().await {
        let text = renderer.render(&event, Utc::now());
        match sender.send(&text).await {
            Ok(()) => debug!(kind = event.kind(), "Sent Telegram notification"),
            Err(e) => warn!(kind = event.kind(), error = %e, "Failed to send Telegram notification"),
        }
    }
    debug!("Telegram delivery stopped");
}

/// Offset used to stamp messages: the exchange offset when configured,
/// otherwise the host's current local offset.
pub fn display_offset(configured: Option<FixedOffset>) -> FixedOffset {
    configured.unwrap_or_else(|| *chrono::Local::now().offset())
}
