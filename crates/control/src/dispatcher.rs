use std::sync::Arc;
use std::time::{Duration, Instant};

use bot_metrics::{MetricsService, TracingService};
use bot_models::{BotError, Config, Message, MessagesConfig, SendMessageRequest, Update};
use bot_telegram::BotApi;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::persistence::Persistence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command { command: Command, args: String },
    Echo { text: String },
    Ignore,
}

/// Picks the handler for an update. Handlers are tried in registration
/// order (`/start`, `/help`, text echo); the first match wins.
pub fn route(update: &Update, bot_username: Option<&str>) -> Route {
    if let Some(message) = update.command_message() {
        if message.is_command() {
            return route_command(message, bot_username);
        }
    }

    match update.effective_message() {
        Some(message) if message.is_command() => Route::Ignore,
        Some(Message { text: Some(text), .. }) if !text.is_empty() => Route::Echo { text: text.clone() },
        _ => Route::Ignore,
    }
}

fn route_command(message: &Message, bot_username: Option<&str>) -> Route {
    let text = message.text.as_deref().unwrap_or_default();
    let (head, args) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    let head = head.trim_start_matches('/');
    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };

    // `/start@OtherBot` in a group is meant for someone else.
    if let (Some(target), Some(me)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(me) {
            return Route::Ignore;
        }
    }

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        _ => return Route::Ignore,
    };
    Route::Command {
        command,
        args: args.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied { message_id: i64 },
    Ignored,
    Failed,
}

pub struct Dispatcher {
    api: Arc<dyn BotApi>,
    messages: MessagesConfig,
    quote_replies: bool,
    max_retry_after: Duration,
    bot_username: Option<String>,
    shutdown: Option<watch::Receiver<bool>>,
    persistence: Arc<Persistence>,
    metrics: Arc<MetricsService>,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn BotApi>,
        config: &Config,
        persistence: Arc<Persistence>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            api,
            messages: config.messages.clone(),
            quote_replies: config.telegram.quote_replies,
            max_retry_after: Duration::from_secs(config.retry.max_retry_after_secs),
            bot_username: None,
            shutdown: None,
            persistence,
            metrics,
        }
    }

    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Cuts rate-limit waits short once shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Runs the matching handler. Handler failures go to the error handler
    /// and never escape, so one bad update cannot stop polling.
    pub async fn handle(&self, update: &Update) -> Outcome {
        let started = Instant::now();
        let message = update.effective_message();
        TracingService::log_update_received(
            update.update_id,
            message.map(|m| m.chat.id),
            update_kind(update),
        );

        if let Some(message) = message {
            self.persistence.record_message(message).await;
        }

        let outcome = match self.dispatch(update).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.on_error(update, &e).await;
                Outcome::Failed
            }
        };

        self.metrics
            .record_handler_duration(started.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    async fn dispatch(&self, update: &Update) -> Result<Outcome, BotError> {
        let route = route(update, self.bot_username.as_deref());
        debug!(update_id = update.update_id, route = ?route, "Routed update");

        let (message, text) = match (&route, update.effective_message()) {
            (Route::Command { command, .. }, Some(message)) => {
                self.metrics.record_command(command.name());
                let text = match command {
                    Command::Start => self.messages.start.clone(),
                    Command::Help => self.messages.help.clone(),
                };
                (message, text)
            }
            (Route::Echo { text }, Some(message)) => (message, self.messages.echo(text)),
            _ => return Ok(Outcome::Ignored),
        };

        let sent = self.reply(message, text).await?;
        Ok(Outcome::Replied {
            message_id: sent.message_id,
        })
    }

    /// Sends `text` to the chat of `message`. A rate-limited send waits
    /// `retry_after` (capped) and is tried once more.
    pub async fn reply(&self, message: &Message, text: String) -> Result<Message, BotError> {
        let request = SendMessageRequest {
            chat_id: message.chat.id,
            text,
            reply_to_message_id: self.quote_replies.then_some(message.message_id),
        };

        let sent = match self.api.send_message(&request).await {
            Err(BotError::RateLimited { retry_after }) => {
                let wait = Duration::from_secs(retry_after).min(self.max_retry_after);
                warn!(chat_id = request.chat_id, wait_secs = wait.as_secs(), "Rate limited, retrying reply");
                if !self.wait_for_retry(wait).await {
                    debug!(chat_id = request.chat_id, "Shutdown requested, reply not retried");
                    return Err(BotError::RateLimited { retry_after });
                }
                self.api.send_message(&request).await?
            }
            other => other?,
        };

        self.metrics.record_message_sent();
        TracingService::log_reply_sent(sent.chat.id, sent.message_id);
        Ok(sent)
    }

    /// Sleeps `wait` and returns true, or returns false as soon as
    /// shutdown is requested.
    async fn wait_for_retry(&self, wait: Duration) -> bool {
        let Some(shutdown) = &self.shutdown else {
            sleep(wait).await;
            return true;
        };
        let mut shutdown = shutdown.clone();
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = sleep(wait) => true,
            Ok(()) = shutdown.changed() => false,
        }
    }

    /// Logs the failure and apologises to the user when there is a chat to
    /// answer in.
    async fn on_error(&self, update: &Update, error: &BotError) {
        TracingService::log_handler_error(update.update_id, error);
        self.metrics.record_handler_error(error);

        let Some(message) = update.effective_message() else {
            return;
        };
        let request = SendMessageRequest {
            chat_id: message.chat.id,
            text: self.messages.error.clone(),
            reply_to_message_id: None,
        };
        match self.api.send_message(&request).await {
            Ok(_) => self.metrics.record_message_sent(),
            Err(e) => error!(
                update_id = update.update_id,
                error = %e,
                "Failed to send the error message to the user"
            ),
        }
    }
}

fn update_kind(update: &Update) -> &'static str {
    if update.message.is_some() {
        "message"
    } else if update.edited_message.is_some() {
        "edited_message"
    } else if update.channel_post.is_some() {
        "channel_post"
    } else if update.edited_channel_post.is_some() {
        "edited_channel_post"
    } else {
        "other"
    }
}
