use std::fmt;
use std::path::Path;

use crate::error::BotError;

pub const TOKEN_ENV: &str = "BOT_TOKEN";
pub const TOKEN_FILE_ENV: &str = "BOT_TOKEN_FILE";

/// Values that show up in copy-pasted Dockerfiles and `.env` templates.
const PLACEHOLDERS: &[&str] = &[
    "your_bot_token_here",
    "your_token_here",
    "your-bot-token",
    "changeme",
    "replace_me",
    "<token>",
    "token",
];

/// Bot API credential. Only ever supplied at runtime.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    pub fn parse(raw: &str) -> Result<Self, BotError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(BotError::MissingToken);
        }
        if is_placeholder(value) {
            return Err(BotError::InvalidToken {
                reason: "placeholder value".to_string(),
            });
        }

        let (id, secret) = value.split_once(':').ok_or_else(|| BotError::InvalidToken {
            reason: "expected <bot id>:<secret>".to_string(),
        })?;
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(BotError::InvalidToken {
                reason: "bot id must be numeric".to_string(),
            });
        }
        if secret.is_empty()
            || !secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BotError::InvalidToken {
                reason: "secret part is empty or has invalid characters".to_string(),
            });
        }

        Ok(Self(value.to_string()))
    }

    /// Reads `BOT_TOKEN`, falling back to the file named by `BOT_TOKEN_FILE`
    /// (a mounted container secret).
    pub fn from_env() -> Result<Self, BotError> {
        match std::env::var(TOKEN_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => match std::env::var(TOKEN_FILE_ENV) {
                Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
                _ => Err(BotError::MissingToken),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, BotError> {
        let contents = std::fs::read_to_string(path).map_err(|e| BotError::Config {
            reason: format!("cannot read token file {}: {}", path.display(), e),
        })?;
        Self::parse(&contents)
    }

    pub fn bot_id(&self) -> &str {
        self.0.split_once(':').map(|(id, _)| id).unwrap_or_default()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BotToken({}:***)", self.bot_id())
    }
}

impl fmt::Display for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:***", self.bot_id())
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let lowered = value.trim().trim_matches('"').to_ascii_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
        || lowered.starts_with("your_")
        || lowered.starts_with("${")
}
