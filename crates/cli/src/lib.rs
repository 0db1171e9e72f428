use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use bot_control::{inspect, SessionState};
use bot_models::{BotToken, Config, SendMessageRequest};
use bot_packaging::{bot_dockerfile, lint_file, ImageSpec, LintPolicy, Severity};
use bot_telegram::{BotApi, TelegramClient};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "bot-cli")]
#[command(about = "Operator tools for the echo bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to $ECHOBOT_CONFIG, then config/echo-bot.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate or check container recipes
    Dockerfile {
        #[command(subcommand)]
        action: DockerfileCommand,
    },

    /// Inspect the single-instance lock
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Check the token by asking the Bot API who we are
    Whoami,

    /// Send a one-off message
    Send {
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,

        #[arg(long)]
        text: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DockerfileCommand {
    /// Print the bot's Dockerfile
    Render {
        /// TOML file with image settings
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Expose the health endpoint on this port
        #[arg(long)]
        health_port: Option<u16>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Lint a Dockerfile; exits non-zero on errors
    Lint {
        #[arg(default_value = "Dockerfile")]
        path: PathBuf,

        /// Treat warnings as errors
        #[arg(long)]
        deny_warnings: bool,

        /// Skip a rule (repeatable); a literal secret is always reported
        #[arg(long = "ignore", value_name = "RULE")]
        ignored: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    Status {
        /// Lock file to inspect (defaults to session.lock_file)
        #[arg(long)]
        lock_file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = Config::resolve_path(explicit);
    debug!(path = ?path, "Loading configuration");
    Config::load(path.as_deref()).context("failed to load configuration")
}

fn client(config: &Config) -> Result<TelegramClient> {
    let token = BotToken::from_env().context("no usable bot token")?;
    TelegramClient::new(&config.telegram, &token).context("failed to create Bot API client")
}

/// Runs one command, writing its output to `out`. `Ok(false)` means the
/// command ran but the check it performs failed.
pub async fn execute(cli: Cli, out: &mut dyn Write) -> Result<bool> {
    match cli.command {
        Commands::Dockerfile { action: DockerfileCommand::Render { spec, health_port, output } } => {
            let mut image = match spec {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("cannot read {}", path.display()))?;
                    toml::from_str::<ImageSpec>(&text).with_context(|| format!("invalid image spec {}", path.display()))?
                }
                None => ImageSpec::default(),
            };
            if health_port.is_some() {
                image.health_port = health_port;
            }

            let rendered = bot_dockerfile(&image).render();
            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered).with_context(|| format!("cannot write {}", path.display()))?;
                    writeln!(out, "Wrote {}", path.display())?;
                }
                None => write!(out, "{}", rendered)?,
            }
            Ok(true)
        }

        Commands::Dockerfile { action: DockerfileCommand::Lint { path, deny_warnings, ignored, format } } => {
            let policy = LintPolicy {
                deny_warnings,
                ignored: ignored.into_iter().collect(),
            };
            let report = lint_file(&path, &policy)?;

            match format {
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
                OutputFormat::Text => {
                    for finding in &report.findings {
                        writeln!(out, "{}:{}", path.display(), finding)?;
                    }
                    writeln!(
                        out,
                        "{}: {} error(s), {} warning(s), {} note(s)",
                        path.display(),
                        report.count(Severity::Error),
                        report.count(Severity::Warning),
                        report.count(Severity::Info)
                    )?;
                }
            }
            Ok(report.passes(&policy))
        }

        Commands::Session { action: SessionCommand::Status { lock_file } } => {
            let path = match lock_file {
                Some(path) => path,
                None => load_config(cli.config)?.session.lock_file,
            };
            let state = inspect(&path)?;
            let description = match state {
                SessionState::Free => "free".to_string(),
                SessionState::Active { pid } => format!("active (pid {})", pid),
                SessionState::Stale { pid } => format!("stale (pid {} is gone)", pid),
                SessionState::Corrupt => "corrupt (unreadable lock file)".to_string(),
            };
            writeln!(out, "{}: {}", path.display(), description)?;
            Ok(true)
        }

        Commands::Config { action: ConfigCommand::Show } => {
            let config = load_config(cli.config)?;
            write!(out, "{}", toml::to_string_pretty(&config)?)?;
            Ok(true)
        }

        Commands::Whoami => {
            let config = load_config(cli.config)?;
            let me = client(&config)?.get_me().await?;
            writeln!(
                out,
                "@{} (id {}, {})",
                me.username.as_deref().unwrap_or("<no username>"),
                me.id,
                me.first_name
            )?;
            Ok(true)
        }

        Commands::Send { chat_id, text } => {
            if text.is_empty() {
                return Err(anyhow!("--text must not be empty"));
            }
            let config = load_config(cli.config)?;
            let sent = client(&config)?
                .send_message(&SendMessageRequest {
                    chat_id,
                    text,
                    reply_to_message_id: None,
                })
                .await?;
            writeln!(out, "Sent message {} to chat {}", sent.message_id, sent.chat.id)?;
            Ok(true)
        }
    }
}
