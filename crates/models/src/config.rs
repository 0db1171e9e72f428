use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::BotError;

pub const ENV_PREFIX: &str = "ECHOBOT_";
pub const CONFIG_PATH_ENV: &str = "ECHOBOT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/echo-bot.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub session: SessionConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    pub health: HealthConfig,
    pub messages: MessagesConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct TelegramConfig {
    pub api_url: String,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub poll_limit: u32,
    pub drop_pending_updates: bool,
    pub allowed_updates: Vec<String>,
    pub quote_replies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub lock_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Mirror of stdout logs. Empty disables the file.
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct MessagesConfig {
    pub start: String,
    pub help: String,
    /// `{text}` is replaced with the received text.
    pub echo_template: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retry_after_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 10,
            request_timeout_secs: 10,
            poll_limit: 100,
            drop_pending_updates: true,
            allowed_updates: vec![
                "message".to_string(),
                "edited_message".to_string(),
                "channel_post".to_string(),
                "edited_channel_post".to_string(),
            ],
            quote_replies: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from("bot_session.lock"),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("persistence.json"),
            flush_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: "bot.log".to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            start: "Hello! I'm the new Telegram bot. How can I help you?".to_string(),
            help: "Send me any text and I will echo it back.\n\n/start - greeting\n/help - this message".to_string(),
            echo_template: "I received your message: {text}".to_string(),
            error: "Sorry, something went wrong while processing your request. Please try again later.".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            max_retry_after_secs: 60,
        }
    }
}

impl MessagesConfig {
    pub fn echo(&self, text: &str) -> String {
        self.echo_template.replace("{text}", text)
    }
}

impl Config {
    /// Defaults, then the TOML file (if any), then `ECHOBOT_<SECTION>__<KEY>`
    /// environment overrides.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, BotError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(BotError::Config {
                    reason: format!("config file not found: {}", path.display()),
                });
            }
        }
        let config: Config = Self::figment(path)
            .extract()
            .map_err(|e| BotError::Config { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Picks the config path: explicit argument, `ECHOBOT_CONFIG`, then the
    /// default location when it exists.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.is_empty()).map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            })
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.telegram.api_url.trim().is_empty() {
            return Err(BotError::Config { reason: "telegram.api_url is empty".to_string() });
        }
        if self.telegram.poll_limit == 0 || self.telegram.poll_limit > 100 {
            return Err(BotError::Config {
                reason: format!("telegram.poll_limit must be 1..=100, got {}", self.telegram.poll_limit),
            });
        }
        if self.retry.initial_backoff_ms == 0 || self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(BotError::Config {
                reason: "retry.initial_backoff_ms must be non-zero and <= retry.max_backoff_ms".to_string(),
            });
        }
        if self.persistence.enabled && self.persistence.flush_interval_secs == 0 {
            return Err(BotError::Config {
                reason: "persistence.flush_interval_secs must be at least 1".to_string(),
            });
        }
        if !self.messages.echo_template.contains("{text}") {
            return Err(BotError::Config {
                reason: "messages.echo_template must contain {text}".to_string(),
            });
        }
        Ok(())
    }

    pub fn log_file(&self) -> Option<&str> {
        let file = self.logging.file.trim();
        (!file.is_empty()).then_some(file)
    }
}
