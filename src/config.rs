//! Application configuration loaded from `config.json`.
//!
//! Everything is validated here, before any worker starts, so a bad file
//! stops the process with a diagnostic instead of failing a worker later.

use crate::error::{BotError, Result};
use crate::telemetry::BrokerAddress;
use crate::web::WebConfig;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Time zone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    /// Broker address, e.g. `tcp://broker.local:1883`
    pub server: String,
    /// Topic the scale publishes to
    pub topic: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Application id from the developer portal
    #[serde(alias = "appToken")]
    pub app_id: String,
    /// Restricts the command to one server; empty registers it globally
    #[serde(default)]
    pub guild_id: String,
    pub bot_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayConfig {
    /// IANA zone used to render reading timestamps
    pub timezone: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            BotError::config_error(format!("Unknown timezone {:?}: {}", self.timezone, e))
        })
    }
}

impl MqttConfig {
    pub fn broker(&self) -> Result<BrokerAddress> {
        BrokerAddress::parse(&self.server)
    }

    /// Configured client id, or one derived from the host name.
    pub fn client_id(&self) -> String {
        match &self.client_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
                format!("propane-bot-{}", host)
            }
        }
    }
}

impl AppConfig {
    /// Parse and validate configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)
            .map_err(|e| BotError::config_error(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::config_error(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Check everything a worker would otherwise trip over at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.topic.trim().is_empty() {
            return Err(BotError::config_error("mqtt.topic must not be empty"));
        }
        self.mqtt.broker()?;

        if let Some(discord) = &self.discord {
            if discord.app_id.trim().is_empty() || discord.bot_token.trim().is_empty() {
                return Err(BotError::config_error(
                    "discord.appId and discord.botToken are required when the discord section is present",
                ));
            }
        }

        if let Some(slack) = &self.slack {
            if slack.api_token.trim().is_empty() {
                return Err(BotError::config_error(
                    "slack.apiToken is required when the slack section is present",
                ));
            }
        }

        self.web.socket_addr()?;
        self.display.timezone()?;
        Ok(())
    }
}
