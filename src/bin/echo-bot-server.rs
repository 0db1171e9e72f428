use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bot_api::AppState;
use bot_metrics::{MetricsService, TracingService};
use bot_models::{BotToken, Config};
use bot_telegram::{BotApi, TelegramClient};
use clap::Parser;
use echo_bot::{shutdown_channel, BotApp};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "echo-bot-server")]
#[command(about = "Telegram echo bot (long polling)")]
struct Args {
    /// Config file (defaults to $ECHOBOT_CONFIG, then config/echo-bot.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

async fn run(config: Config) -> Result<()> {
    let token = BotToken::from_env().context("bot token unavailable (set BOT_TOKEN or BOT_TOKEN_FILE)")?;
    let api: Arc<dyn BotApi> = Arc::new(TelegramClient::new(&config.telegram, &token)?);
    let metrics = Arc::new(MetricsService::new()?);
    let shutdown = shutdown_channel();

    let app = BotApp::new(config.clone(), api, metrics.clone());

    let health = if config.health.enabled {
        let listener = bot_api::bind(&config.health.bind, config.health.port)
            .await
            .context("failed to start the health server")?;
        let state = AppState::new(metrics, app.readiness());
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = bot_api::serve(listener, state, shutdown).await {
                warn!("Health server error: {}", e);
            }
        }))
    } else {
        None
    };

    let result = app.run(shutdown).await;
    if let Some(handle) = health {
        handle.abort();
    }
    Ok(result?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(Config::resolve_path(args.config).as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = TracingService::init(&config.logging, config.log_file()) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting echo bot");
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Echo bot failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
