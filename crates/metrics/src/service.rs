use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use bot_models::BotError;

fn internal(e: prometheus::Error) -> BotError {
    BotError::Internal { reason: e.to_string() }
}

pub struct MetricsService {
    registry: Registry,
    updates_total: Counter,
    messages_sent_total: Counter,
    commands_total: CounterVec,
    handler_errors_total: CounterVec,
    poll_errors_total: CounterVec,
    handler_duration_ms: Histogram,
}

impl MetricsService {
    pub fn new() -> Result<Self, BotError> {
        let registry = Registry::new();

        let updates_total = Counter::new(
            "bot_updates_total",
            "Total number of updates received from the Bot API",
        )
        .map_err(internal)?;

        let messages_sent_total = Counter::new(
            "bot_messages_sent_total",
            "Total number of messages sent by the bot",
        )
        .map_err(internal)?;

        let commands_total = CounterVec::new(
            Opts::new("bot_commands_total", "Total number of handled commands"),
            &["command"],
        )
        .map_err(internal)?;

        let handler_errors_total = CounterVec::new(
            Opts::new("bot_handler_errors_total", "Total number of failed update handlers"),
            &["error_type"],
        )
        .map_err(internal)?;

        let poll_errors_total = CounterVec::new(
            Opts::new("bot_poll_errors_total", "Total number of failed getUpdates calls"),
            &["error_type"],
        )
        .map_err(internal)?;

        let handler_duration_ms = Histogram::with_opts(HistogramOpts::new(
            "bot_handler_duration_ms",
            "Update handling duration in milliseconds",
        ))
        .map_err(internal)?;

        registry.register(Box::new(updates_total.clone())).map_err(internal)?;
        registry.register(Box::new(messages_sent_total.clone())).map_err(internal)?;
        registry.register(Box::new(commands_total.clone())).map_err(internal)?;
        registry.register(Box::new(handler_errors_total.clone())).map_err(internal)?;
        registry.register(Box::new(poll_errors_total.clone())).map_err(internal)?;
        registry.register(Box::new(handler_duration_ms.clone())).map_err(internal)?;

        Ok(Self {
            registry,
            updates_total,
            messages_sent_total,
            commands_total,
            handler_errors_total,
            poll_errors_total,
            handler_duration_ms,
        })
    }

    pub fn record_update(&self) {
        self.updates_total.inc();
    }

    pub fn record_message_sent(&self) {
        self.messages_sent_total.inc();
    }

    pub fn record_command(&self, command: &str) {
        self.commands_total.with_label_values(&[command]).inc();
    }

    pub fn record_handler_error(&self, error: &BotError) {
        self.handler_errors_total.with_label_values(&[error.error_type()]).inc();
    }

    pub fn record_poll_error(&self, error: &BotError) {
        self.poll_errors_total.with_label_values(&[error.error_type()]).inc();
    }

    pub fn record_handler_duration(&self, duration_ms: f64) {
        self.handler_duration_ms.observe(duration_ms);
    }

    pub fn updates_total(&self) -> u64 {
        self.updates_total.get() as u64
    }

    pub fn messages_sent_total(&self) -> u64 {
        self.messages_sent_total.get() as u64
    }

    pub fn get_metrics(&self) -> Result<String, BotError> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer).map_err(internal)?;

        String::from_utf8(buffer).map_err(|e| BotError::Internal { reason: e.to_string() })
    }
}
