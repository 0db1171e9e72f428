use std::sync::Arc;
use std::time::Duration;

use bot_control::{run_flusher, Persistence, PersistedState, STATE_VERSION};
use bot_models::{BotError, PersistenceConfig};
use bot_testsupport::{channel_post_update, scratch_dir, text_update};
use tokio::sync::watch;

#[tokio::test]
async fn missing_file_starts_empty_and_clean() {
    let dir = scratch_dir();
    let path = dir.path().join("persistence.json");

    let store = Persistence::load(&path).unwrap();
    assert!(store.is_persistent());
    assert_eq!(store.snapshot().await, PersistedState::default());
    assert!(!store.flush().await.unwrap());
    assert!(!path.exists());
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = scratch_dir();
    let path = dir.path().join("persistence.json");

    let store = Persistence::load(&path).unwrap();
    store.record_start("instance-a").await;
    store.record_message(text_update(1, 42, "hi").message.as_ref().unwrap()).await;
    store.record_message(channel_post_update(2, -1001, "news").channel_post.as_ref().unwrap()).await;
    assert!(store.is_dirty());
    assert!(store.flush().await.unwrap());
    assert!(!store.is_dirty());
    assert!(!store.flush().await.unwrap());

    let reloaded = Persistence::load(&path).unwrap();
    let state = reloaded.snapshot().await;
    assert_eq!(state, store.snapshot().await);
    assert_eq!(state.version, STATE_VERSION);
    assert_eq!(state.bot_data.started_count, 1);
    assert_eq!(state.bot_data.instance_id.as_deref(), Some("instance-a"));
    assert_eq!(state.chat_data.len(), 2);
    assert_eq!(state.user_data.len(), 1);

    reloaded.record_start("instance-b").await;
    assert_eq!(reloaded.snapshot().await.bot_data.started_count, 2);
}

#[tokio::test]
async fn corrupt_file_is_an_error() {
    let dir = scratch_dir();
    let path = dir.path().join("persistence.json");
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(matches!(Persistence::load(&path), Err(BotError::Persistence { .. })));
    assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
}

#[tokio::test]
async fn newer_format_is_refused() {
    let dir = scratch_dir();
    let path = dir.path().join("persistence.json");
    let body = serde_json::json!({ "version": STATE_VERSION + 1 });
    std::fs::write(&path, body.to_string()).unwrap();

    assert!(matches!(Persistence::load(&path), Err(BotError::Persistence { .. })));
}

#[tokio::test]
async fn disabled_persistence_never_writes() {
    let dir = scratch_dir();
    let config = PersistenceConfig {
        enabled: false,
        path: dir.path().join("persistence.json"),
        ..PersistenceConfig::default()
    };
    let store = Persistence::from_config(&config).unwrap();
    store.record_start("instance").await;

    assert!(!store.is_persistent());
    assert!(!store.flush().await.unwrap());
    assert!(!config.path.exists());
}

#[tokio::test(start_paused = true)]
async fn flusher_writes_on_each_tick_until_shutdown() {
    let dir = scratch_dir();
    let path = dir.path().join("persistence.json");
    let store = Arc::new(Persistence::load(&path).unwrap());
    let (tx, rx) = watch::channel(false);

    let flusher = tokio::spawn(run_flusher(store.clone(), Duration::from_secs(60), rx));
    store.record_start("instance").await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(path.exists());
    assert!(!store.is_dirty());

    tx.send(true).unwrap();
    flusher.await.unwrap();
}
