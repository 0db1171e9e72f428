use std::sync::Arc;
use std::time::Duration;

use bot_metrics::{MetricsService, TracingService};
use bot_models::{BotError, Config, GetUpdatesParams};
use bot_telegram::BotApi;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument};

use crate::backoff::Backoff;
use crate::dispatcher::Dispatcher;

const ACKNOWLEDGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Long-polling loop over `getUpdates`.
pub struct Poller {
    api: Arc<dyn BotApi>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsService>,
    template: GetUpdatesParams,
    backoff: Backoff,
    max_retry_after: Duration,
    offset: Option<i64>,
}

impl Poller {
    pub fn new(
        api: Arc<dyn BotApi>,
        dispatcher: Arc<Dispatcher>,
        config: &Config,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            api,
            dispatcher,
            metrics,
            template: GetUpdatesParams {
                offset: None,
                limit: config.telegram.poll_limit,
                timeout: config.telegram.poll_timeout_secs,
                allowed_updates: config.telegram.allowed_updates.clone(),
            },
            backoff: Backoff::from_config(&config.retry),
            max_retry_after: Duration::from_secs(config.retry.max_retry_after_secs),
            offset: None,
        }
    }

    /// Next update id to request; everything below it has been handled.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Polls until `shutdown` flips or a fatal error occurs. Updates of a
    /// batch are handled one at a time, in order.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        info!(
            timeout_secs = self.template.timeout,
            limit = self.template.limit,
            "Polling started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let params = GetUpdatesParams {
                offset: self.offset,
                ..self.template.clone()
            };
            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.api.get_updates(&params) => result,
            };

            let delay = match result {
                Ok(updates) => {
                    self.backoff.reset();
                    for update in updates {
                        self.offset = Some(update.update_id + 1);
                        self.metrics.record_update();
                        self.dispatcher.handle(&update).await;
                    }
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    self.metrics.record_poll_error(&e);
                    error!(error = %e, "Polling aborted");
                    return Err(e);
                }
                Err(BotError::RateLimited { retry_after }) => {
                    let delay = Duration::from_secs(retry_after).min(self.max_retry_after);
                    let e = BotError::RateLimited { retry_after };
                    self.metrics.record_poll_error(&e);
                    TracingService::log_poll_error(&e, delay.as_millis() as u64);
                    delay
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    self.metrics.record_poll_error(&e);
                    TracingService::log_poll_error(&e, delay.as_millis() as u64);
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(delay) => {}
            }
        }

        self.acknowledge().await;
        info!(offset = ?self.offset, "Polling stopped");
        Ok(())
    }

    /// Confirms handled updates so a restart does not receive them again.
    async fn acknowledge(&self) {
        let Some(offset) = self.offset else {
            return;
        };
        let params = GetUpdatesParams {
            offset: Some(offset),
            limit: 1,
            timeout: 0,
            allowed_updates: self.template.allowed_updates.clone(),
        };
        match timeout(ACKNOWLEDGE_TIMEOUT, self.api.get_updates(&params)).await {
            Ok(Ok(_)) => debug!(offset, "Acknowledged handled updates"),
            Ok(Err(e)) => debug!(offset, error = %e, "Failed to acknowledge handled updates"),
            Err(_) => debug!(offset, "Timed out acknowledging handled updates"),
        }
    }
}
