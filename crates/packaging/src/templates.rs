use serde::{Deserialize, Serialize};

use crate::recipe::{BuildRecipe, CommandForm, Instruction};

/// Inputs for the bot's container recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSpec {
    pub builder_image: String,
    pub runtime_image: String,
    /// Binary target built in the builder stage and run as the default command.
    pub binary: String,
    pub workdir: String,
    pub user: String,
    pub uid: u32,
    /// Directory copied next to the binary, e.g. the TOML config.
    pub config_dir: Option<String>,
    /// Exposed when the health endpoint is enabled.
    pub health_port: Option<u16>,
    pub log_level: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            builder_image: "rust:1-slim-bookworm".to_string(),
            runtime_image: "debian:bookworm-slim".to_string(),
            binary: "echo-bot-server".to_string(),
            workdir: "/app".to_string(),
            user: "bot".to_string(),
            uid: 10001,
            config_dir: Some("config".to_string()),
            health_port: None,
            log_level: "info".to_string(),
        }
    }
}

const BUILD_DIR: &str = "/build";

/// Multi-stage recipe for the bot.
///
/// The builder tracks the current stable toolchain and keeps the cargo
/// registry and target directories in cache mounts, so a source change
/// rebuilds only the crates that changed. The runtime stage runs
/// the binary in exec form as an unprivileged user. The bot token is read
/// from the environment at run time and never appears in the recipe.
pub fn bot_dockerfile(spec: &ImageSpec) -> BuildRecipe {
    let installed = format!("/usr/local/bin/{}", spec.binary);
    let mut recipe = BuildRecipe::new();

    recipe
        .push(Instruction::From {
            image: spec.builder_image.clone(),
            alias: Some("builder".to_string()),
            platform: None,
        })
        .push(Instruction::Workdir { path: BUILD_DIR.to_string() })
        .push(Instruction::Copy {
            from: None,
            flags: Vec::new(),
            sources: vec!["Cargo.toml".to_string(), "Cargo.lock*".to_string()],
            dest: "./".to_string(),
        })
        .push(Instruction::Copy {
            from: None,
            flags: Vec::new(),
            sources: vec!["crates".to_string()],
            dest: "./crates".to_string(),
        })
        .push(Instruction::Copy {
            from: None,
            flags: Vec::new(),
            sources: vec!["src".to_string()],
            dest: "./src".to_string(),
        })
        .push(Instruction::Run {
            flags: vec![
                "--mount=type=cache,target=/usr/local/cargo/registry".to_string(),
                format!("--mount=type=cache,target={}/target", BUILD_DIR),
            ],
            command: CommandForm::Shell(format!(
                "cargo build --release --bin {bin} && cp target/release/{bin} {dest}",
                bin = spec.binary,
                dest = installed,
            )),
        })
        .push(Instruction::From {
            image: spec.runtime_image.clone(),
            alias: None,
            platform: None,
        })
        .push(Instruction::Run {
            flags: Vec::new(),
            command: CommandForm::Shell(
                "apt-get update && apt-get install -y --no-install-recommends ca-certificates && rm -rf /var/lib/apt/lists/*"
                    .to_string(),
            ),
        })
        .push(Instruction::Run {
            flags: Vec::new(),
            command: CommandForm::Shell(format!(
                "useradd --system --uid {uid} --create-home --home-dir {home} {user}",
                uid = spec.uid,
                home = spec.workdir,
                user = spec.user,
            )),
        })
        .push(Instruction::Workdir { path: spec.workdir.clone() })
        .push(Instruction::Copy {
            from: Some("builder".to_string()),
            flags: Vec::new(),
            sources: vec![installed.clone()],
            dest: installed,
        });

    if let Some(config_dir) = &spec.config_dir {
        recipe.push(Instruction::Copy {
            from: None,
            flags: vec![format!("--chown={}:{}", spec.uid, spec.uid)],
            sources: vec![config_dir.clone()],
            dest: format!("./{}", config_dir),
        });
    }

    recipe.push(Instruction::Env {
        vars: vec![("RUST_LOG".to_string(), spec.log_level.clone())],
    });
    if let Some(port) = spec.health_port {
        recipe
            .push(Instruction::Env {
                vars: vec![
                    ("ECHOBOT_HEALTH__ENABLED".to_string(), "true".to_string()),
                    ("ECHOBOT_HEALTH__PORT".to_string(), port.to_string()),
                ],
            })
            .push(Instruction::Expose { ports: vec![port.to_string()] });
    }

    recipe
        .push(Instruction::User { user: format!("{}:{}", spec.uid, spec.uid) })
        .push(Instruction::Cmd {
            command: CommandForm::exec([spec.binary.clone()]),
        });
    recipe
}
