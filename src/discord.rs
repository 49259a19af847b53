//! Discord channel notifier over the REST API.
//!
//! Messages are posted with `POST /channels/{id}/messages` and the pending
//! summary is edited with `PATCH /channels/{id}/messages/{message}`. When
//! the remembered message was deleted (HTTP 404, Discord error 10008), a
//! fresh message is posted and its id becomes the new checkpoint.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NotifierConfig;
use crate::notify::{Embed, Notifier};

pub struct DiscordNotifier {
    http: reqwest::Client,
    api_base: String,
    channel_id: String,
    token: String,
}

impl DiscordNotifier {
    pub fn new(config: &NotifierConfig, timeout_secs: u64) -> Result<Self> {
        let token = config.resolved_token().ok_or_else(|| {
            anyhow::anyhow!("notifier.bot_token not set and DISCORD_BOT_TOKEN is empty")
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client for Discord")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_id: config.channel_id.clone(),
            token,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }

    /// Post a message and return its id.
    async fn post(&self, embed: &Embed) -> Result<String> {
        let response = self
            .http
            .post(self.messages_url())
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await
            .context("Discord request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Discord API error {}: {}", status, body);
        }
        let message: Value = response.json().await?;
        message_id(&message)
    }
}

fn message_id(message: &Value) -> Result<String> {
    message
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Discord response: missing message id"))
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, embed: &Embed) -> Result<()> {
        let id = self.post(embed).await?;
        debug!(message = %id, "posted message");
        Ok(())
    }

    async fn send_or_update(
        &self,
        checkpoint: Option<&str>,
        embed: &Embed,
    ) -> Result<Option<String>> {
        let Some(message) = checkpoint else {
            return self.post(embed).await.map(Some);
        };

        let response = self
            .http
            .patch(format!("{}/{}", self.messages_url(), message))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await
            .context("Discord request failed")?;

        let status = response.status();
        if status.is_success() {
            debug!(message, "updated message");
            return Ok(Some(message.to_string()));
        }
        if status.as_u16() == 404 {
            warn!(message, "previous summary message not found, posting a new one");
            return self.post(embed).await.map(Some);
        }

        let body = response.text().await.unwrap_or_default();
        bail!("Discord API error {}: {}", status, body);
    }
}
