use async_trait::async_trait;
use serde::Serialize;
use reqwest::Client;
use tracing::{info, error, warn};

use crate::config::{ChannelConfig, NotificationsConfig};
use crate::dispatcher::NotificationSink;

const EMBED_COLOR: u32 = 0x3498DB;
const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct TelegramPayload {
    chat_id: String,
    text: String,
}

/// Delivers event messages to named channels over Discord webhooks and Telegram.
pub struct Notifier {
    client: Client,
    config: NotificationsConfig,
    telegram_api: String,
}

impl Notifier {
    pub fn new(config: NotificationsConfig) -> Self {
        Self::with_telegram_api(config, TELEGRAM_API.to_string())
    }

    pub fn with_telegram_api(config: NotificationsConfig, telegram_api: String) -> Self {
        Self {
            client: Client::new(),
            config,
            telegram_api,
        }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.config.channels.contains_key(name)
    }

    async fn send_discord(&self, webhook: &str, text: &str) {
        let (title, body) = split_header(text);
        let payload = DiscordPayload {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: body.to_string(),
                color: EMBED_COLOR,
            }],
        };

        match self.client.post(webhook).json(&payload).send().await {
            Ok(r) if r.status().is_success() => info!("Discord notification sent"),
            Ok(r) => error!("Discord webhook rejected notification: {}", r.status()),
            Err(e) => error!("Failed to send Discord notification: {}", e),
        }
    }

    async fn send_telegram(&self, chat_id: &str, text: &str) {
        let token = match &self.config.telegram_bot_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                warn!("Telegram chat configured but no bot token set");
                return;
            }
        };

        let payload = TelegramPayload {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        };
        let url = format!("{}/bot{}/sendMessage", self.telegram_api, token);

        match self.client.post(&url).json(&payload).send().await {
            Ok(r) if r.status().is_success() => info!("Telegram notification sent"),
            Ok(r) => error!("Telegram rejected notification: {}", r.status()),
            Err(e) => error!("Failed to send Telegram notification: {}", e),
        }
    }
}

#[async_trait]
impl NotificationSink for Notifier {
    async fn deliver(&self, target: &str, text: &str) {
        let Some(ChannelConfig { discord_webhook, telegram_chat_id }) =
            self.config.channels.get(target)
        else {
            warn!("No channel named {}, dropping notification", target);
            return;
        };

        if let Some(webhook) = discord_webhook.as_deref().filter(|w| !w.is_empty()) {
            self.send_discord(webhook, text).await;
        }
        if let Some(chat_id) = telegram_chat_id.as_deref().filter(|c| !c.is_empty()) {
            self.send_telegram(chat_id, text).await;
        }
    }
}

/// Splits off the first line so Discord can show it as the embed title.
fn split_header(text: &str) -> (&str, &str) {
    let text = text.trim_start_matches(">>> ");
    text.split_once('\n').unwrap_or((text, ""))
}
