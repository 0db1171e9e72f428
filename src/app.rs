use std::sync::Arc;
use std::time::Duration;

use bot_api::Readiness;
use bot_control::{run_flusher, Dispatcher, Persistence, Poller, SessionLock};
use bot_metrics::{MetricsService, TracingService};
use bot_models::{BotError, Config};
use bot_telegram::BotApi;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// One bot process: session lock, Bot API session, polling and teardown.
pub struct BotApp {
    config: Config,
    api: Arc<dyn BotApi>,
    metrics: Arc<MetricsService>,
    readiness: Readiness,
}

impl BotApp {
    pub fn new(config: Config, api: Arc<dyn BotApi>, metrics: Arc<MetricsService>) -> Self {
        Self {
            config,
            api,
            metrics,
            readiness: Readiness::new(),
        }
    }

    /// Flag that is set while updates are being polled.
    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Runs until `shutdown` flips (returns `Ok`) or start-up or polling
    /// fails for good (returns the error). The session lock is released on
    /// both paths.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        let lock = SessionLock::acquire(&self.config.session.lock_file)?;

        let result = self.serve(shutdown).await;
        self.readiness.set(false);

        if let Err(e) = lock.release() {
            warn!(error = %e, "Failed to release the session lock");
        }
        match &result {
            Ok(()) => info!("Bot stopped"),
            Err(e) => error!(error_type = e.error_type(), "Bot stopped: {}", e),
        }
        result
    }

    async fn serve(&self, shutdown: watch::Receiver<bool>) -> Result<(), BotError> {
        let persistence = Arc::new(Persistence::from_config(&self.config.persistence)?);

        let me = self.api.get_me().await?;
        let username = me.username.clone().unwrap_or_else(|| me.first_name.clone());

        // Long polling only works without a webhook; a failure here is not
        // fatal since getUpdates reports the conflict itself.
        match self.api.delete_webhook(self.config.telegram.drop_pending_updates).await {
            Ok(_) => info!(
                drop_pending_updates = self.config.telegram.drop_pending_updates,
                "Webhook removed"
            ),
            Err(e) => warn!(error = %e, "Failed to delete webhook, continuing with polling"),
        }

        let instance_id = Uuid::new_v4().to_string();
        persistence.record_start(&instance_id).await;

        let dispatcher = Arc::new(
            Dispatcher::new(self.api.clone(), &self.config, persistence.clone(), self.metrics.clone())
                .with_bot_username(me.username.clone())
                .with_shutdown(shutdown.clone()),
        );

        let (stop_flusher, flusher_stop) = watch::channel(false);
        let flusher = persistence.is_persistent().then(|| {
            tokio::spawn(run_flusher(
                persistence.clone(),
                Duration::from_secs(self.config.persistence.flush_interval_secs),
                flusher_stop,
            ))
        });

        TracingService::log_started(&username, &instance_id);
        self.readiness.set(true);

        let mut poller = Poller::new(self.api.clone(), dispatcher, &self.config, self.metrics.clone());
        let result = poller.run(shutdown).await;
        self.readiness.set(false);

        let _ = stop_flusher.send(true);
        if let Some(flusher) = flusher {
            if let Err(e) = flusher.await {
                warn!(error = %e, "Persistence flusher task failed");
            }
        }
        if let Err(e) = persistence.flush().await {
            error!(error = %e, "Final persistence flush failed");
        }

        result
    }
}
