use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bot_models::{BotError, Message, PersistenceConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotRecord {
    pub started_count: u64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub first_name: String,
    pub username: Option<String>,
    pub message_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRecord {
    pub kind: String,
    pub title: Option<String>,
    pub message_count: u64,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub version: u32,
    pub bot_data: BotRecord,
    pub user_data: BTreeMap<i64, UserRecord>,
    pub chat_data: BTreeMap<i64, ChatRecord>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            bot_data: BotRecord::default(),
            user_data: BTreeMap::new(),
            chat_data: BTreeMap::new(),
        }
    }
}

/// Bot, user and chat data kept across restarts in one JSON file.
///
/// Mutations only mark the store dirty; [`Persistence::flush`] writes the
/// whole state atomically (temp file in the same directory, then rename).
pub struct Persistence {
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
    dirty: AtomicBool,
}

impl Persistence {
    /// Keeps state for the process lifetime only.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PersistedState::default()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Result<Self, BotError> {
        if config.enabled {
            Self::load(&config.path)
        } else {
            Ok(Self::in_memory())
        }
    }

    /// A missing file starts empty; an unreadable one is an error rather
    /// than silently discarded.
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let state = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<PersistedState>(&bytes).map_err(|e| BotError::Persistence {
                reason: format!("{} is not valid persistence data: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => {
                return Err(BotError::Persistence {
                    reason: format!("cannot read {}: {}", path.display(), e),
                })
            }
        };

        if state.version > STATE_VERSION {
            return Err(BotError::Persistence {
                reason: format!("unsupported persistence version {}", state.version),
            });
        }

        info!(
            path = %path.display(),
            users = state.user_data.len(),
            chats = state.chat_data.len(),
            "Persistence loaded"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.clone()
    }

    pub async fn record_start(&self, instance_id: &str) {
        let mut state = self.state.lock().await;
        state.bot_data.started_count += 1;
        state.bot_data.last_started_at = Some(Utc::now());
        state.bot_data.instance_id = Some(instance_id.to_string());
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub async fn record_message(&self, message: &Message) {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if let Some(user) = &message.from {
            let record = state.user_data.entry(user.id).or_insert_with(|| UserRecord {
                first_name: user.first_name.clone(),
                username: user.username.clone(),
                message_count: 0,
                first_seen: now,
                last_seen: now,
            });
            record.first_name = user.first_name.clone();
            record.username = user.username.clone();
            record.message_count += 1;
            record.last_seen = now;
        }

        let chat = &message.chat;
        let record = state.chat_data.entry(chat.id).or_insert_with(|| ChatRecord {
            kind: chat.kind.clone(),
            title: chat.title.clone(),
            message_count: 0,
            last_message_at: now,
        });
        record.title = chat.title.clone();
        record.message_count += 1;
        record.last_message_at = now;

        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Writes the state if anything changed. Returns whether a write happened.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<bool, BotError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let bytes = {
            let state = self.state.lock().await;
            serde_json::to_vec_pretty(&*state).map_err(|e| BotError::Persistence { reason: e.to_string() })?
        };

        if let Err(e) = write_atomically(path, &bytes) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        debug!(path = %path.display(), bytes = bytes.len(), "Persistence flushed");
        Ok(true)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BotError::Persistence {
        reason: format!("cannot replace {}: {}", path.display(), e.error),
    })?;
    Ok(())
}

/// Flushes on every tick until shutdown. The final flush is the caller's.
pub async fn run_flusher(persistence: Arc<Persistence>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = persistence.flush().await {
                    error!("Periodic persistence flush failed: {}", e);
                }
            }
        }
        if *shutdown.borrow() {
            break;
        }
    }
}
