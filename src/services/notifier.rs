//! Outbound notification channels.
//!
//! Delivery is best effort: a channel reports success or failure and never
//! retries on its own.

use crate::config::NotifyConfig;
use crate::types::Notification;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::future::{join_all, BoxFuture};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const NOTIFY_TIMEOUT_SECS: u64 = 10;

/// A delivery channel.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one notification. `true` when the channel accepted it.
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, bool>;
}

fn http_client() -> Client {
    Client::builder()
        .user_agent("Vigil/1.0")
        .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

// =============================================================================
// DingTalk
// =============================================================================

#[derive(Debug, Deserialize)]
struct DingTalkResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// DingTalk custom robot (markdown messages).
pub struct DingTalkNotifier {
    client: Client,
    webhook: String,
    secret: Option<String>,
}

impl DingTalkNotifier {
    pub fn new(webhook: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            client: http_client(),
            webhook: webhook.into(),
            secret,
        }
    }

    async fn send(&self, notification: &Notification) -> Result<(), String> {
        let body = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": notification.title,
                "text": notification.message,
            }
        });

        let mut request = self.client.post(&self.webhook).json(&body);
        if let Some(secret) = &self.secret {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let sign = dingtalk_sign(secret, timestamp)?;
            request = request.query(&[("timestamp", timestamp.to_string()), ("sign", sign)]);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let reply: DingTalkResponse = response.json().await.map_err(|e| e.to_string())?;
        if reply.errcode != 0 {
            return Err(format!("errcode {}: {}", reply.errcode, reply.errmsg));
        }
        Ok(())
    }
}

/// Robot signature: base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")).
fn dingtalk_sign(secret: &str, timestamp: i64) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(format!("{}\n{}", timestamp, secret).as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

impl Notifier for DingTalkNotifier {
    fn name(&self) -> &str {
        "dingtalk"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match self.send(notification).await {
                Ok(()) => {
                    debug!(title = %notification.title, "DingTalk message sent");
                    true
                }
                Err(e) => {
                    error!("Failed to send DingTalk message: {}", e);
                    false
                }
            }
        })
    }
}

// =============================================================================
// Telegram
// =============================================================================

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    async fn send(&self, notification: &Notification) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let text = telegram_text(notification);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let reply: TelegramResponse = response.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() || !reply.ok {
            return Err(format!(
                "HTTP {}: {}",
                status,
                reply.description.unwrap_or_default()
            ));
        }
        Ok(())
    }
}

/// Bold title, then the body with markdown heading markers removed.
fn telegram_text(notification: &Notification) -> String {
    let body: Vec<&str> = notification
        .message
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start()
            } else {
                line
            }
        })
        .collect();
    format!("*{}*\n\n{}", notification.title, body.join("\n"))
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match self.send(notification).await {
                Ok(()) => {
                    info!("📨 Telegram message sent successfully");
                    true
                }
                Err(e) => {
                    error!("Failed to send Telegram message: {}", e);
                    false
                }
            }
        })
    }
}

// =============================================================================
// Fanout
// =============================================================================

/// Sends to every configured channel; succeeds if any channel does.
#[derive(Default)]
pub struct FanoutNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Channels that have credentials in `config`.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();

        if let Some(webhook) = &config.dingtalk_webhook {
            channels.push(Arc::new(DingTalkNotifier::new(
                webhook.clone(),
                config.dingtalk_secret.clone(),
            )));
        }
        if let (Some(token), Some(chat_id)) = (&config.telegram_bot_token, &config.telegram_chat_id)
        {
            channels.push(Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())));
        }

        if channels.is_empty() {
            warn!("No notification channel configured; notifications will only be logged");
        }
        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if self.channels.is_empty() {
                info!(title = %notification.title, "{}", notification.message);
                return false;
            }
            let results = join_all(self.channels.iter().map(|c| c.notify(notification))).await;
            results.into_iter().any(|ok| ok)
        })
    }
}
