use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorShape {
    pub error_message: String,
    pub error_type: String,
}

#[derive(Error, Debug)]
pub enum BotError {
    #[error("BOT_TOKEN is not set in the runtime environment")]
    MissingToken,

    #[error("Invalid bot token: {reason}")]
    InvalidToken { reason: String },

    #[error("Another session of this bot is already running with pid {pid}")]
    SessionActive { pid: u32 },

    #[error("Conflict: {description}. Another bot instance may be using the same token")]
    Conflict { description: String },

    #[error("Unauthorized: the Bot API rejected the token")]
    Unauthorized,

    #[error("Rate limited by the Bot API, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Failed to decode Bot API response: {reason}")]
    Decode { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Persistence error: {reason}")]
    Persistence { reason: String },

    #[error("Packaging error: {reason}")]
    Packaging { reason: String },

    #[error("Handler failed: {reason}")]
    Handler { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape {
            error_message: self.to_string(),
            error_type: self.error_type().to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            BotError::MissingToken => "MissingToken",
            BotError::InvalidToken { .. } => "InvalidToken",
            BotError::SessionActive { .. } => "SessionActive",
            BotError::Conflict { .. } => "Conflict",
            BotError::Unauthorized => "Unauthorized",
            BotError::RateLimited { .. } => "RateLimited",
            BotError::Api { .. } => "ApiError",
            BotError::Network { .. } => "NetworkError",
            BotError::Decode { .. } => "DecodeError",
            BotError::Config { .. } => "ConfigError",
            BotError::Persistence { .. } => "PersistenceError",
            BotError::Packaging { .. } => "PackagingError",
            BotError::Handler { .. } => "HandlerError",
            BotError::Internal { .. } => "InternalError",
            BotError::Io(_) => "IoError",
        }
    }

    /// Errors after which polling must stop: retrying cannot succeed while
    /// the token is wrong or another poller holds the update stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::MissingToken
                | BotError::InvalidToken { .. }
                | BotError::SessionActive { .. }
                | BotError::Conflict { .. }
                | BotError::Unauthorized
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            BotError::Network { .. } | BotError::RateLimited { .. } => true,
            BotError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
