use serde::Deserialize;
use std::collections::HashMap;
use config::{Config, ConfigError, File};

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_explorer_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_explorer_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    pub discord_webhook: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub telegram_bot_token: Option<String>,
    pub default_channel: String,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

/// A contract to register and subscribe at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub channel: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub directory: String,
    #[serde(default = "default_log_file")]
    pub file_prefix: String,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_file() -> String {
    "notifier.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file_prefix: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub explorer: ExplorerConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var("NOTIFIER_CONFIG").unwrap_or_else(|_| "config".to_string());
        let builder = Config::builder()
            .add_source(File::with_name(&path));

        let cfg = builder.build()?;
        let mut config: AppConfig = cfg.try_deserialize()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `.env` style overrides; `PROVIDER` wins over `RPC_URL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PROVIDER").or_else(|| lookup("RPC_URL")) {
            self.provider.ws_url = url;
        }
        if let Some(key) = lookup("ETHERSCAN_API_KEY") {
            self.explorer.api_key = key;
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.notifications.telegram_bot_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SAMPLE: &str = r#"
        [provider]
        ws_url = "wss://node.example"

        [explorer]
        api_key = "abc"

        [notifications]
        default_channel = "general"

        [notifications.channels.general]
        discord_webhook = "https://discord.example/hook"

        [[contracts]]
        address = "0xdAC17F958D2ee523a2206206994597C13D831ec7"
        events = ["Transfer"]
    "#;

    fn sample() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(SAMPLE, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = sample();
        assert_eq!(config.explorer.api_url, "https://api.etherscan.io/api");
        assert_eq!(config.logging.directory, "logs");
        assert_eq!(config.contracts.len(), 1);
        assert!(config.contracts[0].channel.is_none());
        assert_eq!(
            config.notifications.channels["general"].discord_webhook.as_deref(),
            Some("https://discord.example/hook")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = sample();
        config.apply_env(|key| match key {
            "RPC_URL" => Some("wss://rpc".to_string()),
            "PROVIDER" => Some("wss://provider".to_string()),
            "ETHERSCAN_API_KEY" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.provider.ws_url, "wss://provider");
        assert_eq!(config.explorer.api_key, "secret");
        assert!(config.notifications.telegram_bot_token.is_none());
    }
}
