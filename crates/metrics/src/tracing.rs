use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use ::tracing::{error, info, warn};
use bot_models::{BotError, LoggingConfig};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub struct TracingService;

impl TracingService {
    /// Installs the global subscriber: stdout plus an optional append-only
    /// log file. `RUST_LOG` wins over the configured level.
    pub fn init(config: &LoggingConfig, log_file: Option<&str>) -> Result<(), BotError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| BotError::Config { reason: format!("invalid log level: {}", e) })?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if config.json {
            layers.push(fmt::layer().json().with_timer(UtcTime::rfc_3339()).boxed());
        } else {
            layers.push(fmt::layer().with_timer(UtcTime::rfc_3339()).boxed());
        }

        if let Some(path) = log_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(path))?;
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(Mutex::new(file))
                    .boxed(),
            );
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| BotError::Internal { reason: e.to_string() })?;

        Ok(())
    }

    pub fn log_started(bot_username: &str, instance_id: &str) {
        info!(
            bot_username = %bot_username,
            instance_id = %instance_id,
            "Bot is running"
        );
    }

    pub fn log_update_received(update_id: i64, chat_id: Option<i64>, kind: &str) {
        info!(
            update_id = update_id,
            chat_id = chat_id.unwrap_or_default(),
            kind = %kind,
            "Update received"
        );
    }

    pub fn log_reply_sent(chat_id: i64, message_id: i64) {
        info!(
            chat_id = chat_id,
            message_id = message_id,
            "Reply sent"
        );
    }

    pub fn log_handler_error(update_id: i64, error: &BotError) {
        error!(
            update_id = update_id,
            error_type = %error.error_type(),
            error_message = %error,
            "Update caused error"
        );
    }

    pub fn log_poll_error(error: &BotError, retry_in_ms: u64) {
        warn!(
            error_type = %error.error_type(),
            error_message = %error,
            retry_in_ms = retry_in_ms,
            "getUpdates failed"
        );
    }

    pub fn log_session(event: &str, path: &Path, pid: u32) {
        info!(
            path = %path.display(),
            pid = pid,
            "Session lock {}", event
        );
    }
}
