// src/telegram_client.rs
// Telegram Bot API: operator notifications and manual publishing hand-off
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::capabilities::{Notifier, Poster, PublishRequest, Severity};
use crate::error::{parse_retry_after, CapabilityError};

/// Telegram caps a media group at ten items.
const MAX_MEDIA_GROUP: usize = 10;

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    /// `https://api.telegram.org/bot<token>`
    bot_url: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

fn media_group(image_urls: &[String]) -> Vec<Value> {
    image_urls
        .iter()
        .take(MAX_MEDIA_GROUP)
        .map(|url| json!({ "type": "photo", "media": url }))
        .collect()
}

fn hand_off_message(request: &PublishRequest) -> String {
    format!(
        "Ready to publish {} ({} image(s))\nLocation: {}\nAlt text: {}\n\n{}",
        request.kind,
        request.image_urls.len(),
        request.location,
        request.alt_text,
        request.caption
    )
}

impl TelegramClient {
    pub fn new(bot_url: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_url: bot_url.into().trim_end_matches('/').to_string(),
            chat_id: chat_id.into(),
        }
    }

    async fn call(&self, method: &str, payload: Value) -> Result<(), CapabilityError> {
        let response = self
            .client
            .post(format!("{}/{}", self.bot_url, method))
            .timeout(Duration::from_secs(30))
            .json(&payload)
            .send()
            .await
            .map_err(|e| CapabilityError::from_transport(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status, retry_after, &body));
        }

        let reply: TelegramReply = serde_json::from_str(&body).map_err(|e| {
            CapabilityError::Rejected(format!("Failed to parse Telegram reply: {}", e))
        })?;
        if !reply.ok {
            return Err(CapabilityError::Rejected(
                reply
                    .description
                    .unwrap_or_else(|| format!("Telegram {} failed", method)),
            ));
        }
        Ok(())
    }

    pub async fn send_message(&self, text: &str) -> Result<(), CapabilityError> {
        self.call("sendMessage", json!({ "chat_id": self.chat_id, "text": text }))
            .await
    }

    pub async fn send_media_group(&self, image_urls: &[String]) -> Result<(), CapabilityError> {
        self.call(
            "sendMediaGroup",
            json!({ "chat_id": self.chat_id, "media": media_group(image_urls) }),
        )
        .await
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, message: &str, _severity: Severity) -> Result<(), CapabilityError> {
        self.send_message(message).await
    }
}

/// Hands the assembled content to the operator, who publishes it by hand.
#[async_trait]
impl Poster for TelegramClient {
    async fn post(&self, request: &PublishRequest) -> Result<(), CapabilityError> {
        if request.image_urls.is_empty() {
            return Err(CapabilityError::Rejected("Nothing to publish".to_string()));
        }
        self.send_message(&hand_off_message(request)).await?;
        if request.image_urls.len() == 1 {
            self.call(
                "sendPhoto",
                json!({ "chat_id": self.chat_id, "photo": request.image_urls[0] }),
            )
            .await?;
        } else {
            self.send_media_group(&request.image_urls).await?;
        }
        info!(
            "Handed off {} with {} image(s) to Telegram",
            request.kind,
            request.image_urls.len()
        );
        Ok(())
    }
}
