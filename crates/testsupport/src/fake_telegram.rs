use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bot_models::{BotToken, Chat, Message, SendMessageRequest, TelegramConfig, Update, User};
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

pub const TEST_TOKEN: &str = "123456:TEST-token_abcdefghijklmnopqrstuvwxyz";
pub const TEST_BOT_USERNAME: &str = "echo_test_bot";

#[derive(Debug, Clone)]
struct ScriptedFailure {
    code: u16,
    description: String,
    retry_after: Option<u64>,
}

struct FakeState {
    updates: Mutex<Vec<Update>>,
    sent: Mutex<Vec<SendMessageRequest>>,
    calls: Mutex<Vec<(String, Value)>>,
    failures: Mutex<HashMap<String, VecDeque<ScriptedFailure>>>,
    notify: Notify,
    next_message_id: AtomicI64,
    me: User,
}

/// In-process stand-in for the Bot API, served over real HTTP so the
/// reqwest client is exercised end to end.
pub struct FakeTelegram {
    pub base_url: String,
    state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeTelegram {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(FakeState {
            updates: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            next_message_id: AtomicI64::new(1000),
            me: User {
                id: 123456,
                is_bot: true,
                first_name: "Echo Test".to_string(),
                last_name: None,
                username: Some(TEST_BOT_USERNAME.to_string()),
            },
        });

        let app = Router::new()
            .route("/:bot/:method", post(handle_method))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        })
    }

    pub fn token(&self) -> BotToken {
        BotToken::parse(TEST_TOKEN).expect("test token is well formed")
    }

    /// Client settings pointing at this server with short polls.
    pub fn config(&self) -> TelegramConfig {
        TelegramConfig {
            api_url: self.base_url.clone(),
            poll_timeout_secs: 1,
            request_timeout_secs: 5,
            ..TelegramConfig::default()
        }
    }

    pub fn push_update(&self, update: Update) {
        self.state.updates.lock().unwrap().push(update);
        self.state.notify.notify_one();
    }

    /// The next call to `method` answers with this error instead.
    pub fn fail_next(&self, method: &str, code: u16, description: &str, retry_after: Option<u64>) {
        self.state
            .failures
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(ScriptedFailure {
                code,
                description: description.to_string(),
                retry_after,
            });
    }

    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn pending_updates(&self) -> usize {
        self.state.updates.lock().unwrap().len()
    }

    pub async fn wait_for_sent(&self, count: usize, within: Duration) -> Result<Vec<SendMessageRequest>> {
        let deadline = Instant::now() + within;
        loop {
            let sent = self.sent_messages();
            if sent.len() >= count {
                return Ok(sent);
            }
            if Instant::now() >= deadline {
                anyhow::bail!("expected {} sent messages, got {}: {:?}", count, sent.len(), sent);
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_calls(&self, method: &str, count: usize, within: Duration) -> Result<Vec<Value>> {
        let deadline = Instant::now() + within;
        loop {
            let calls = self.calls(method);
            if calls.len() >= count {
                return Ok(calls);
            }
            if Instant::now() >= deadline {
                anyhow::bail!("expected {} {} calls, got {}", count, method, calls.len());
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeTelegram {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Reply = (StatusCode, Json<Value>);

fn ok(result: Value) -> Reply {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}

fn failure(code: u16, description: &str, retry_after: Option<u64>) -> Reply {
    let mut body = json!({ "ok": false, "error_code": code, "description": description });
    if let Some(retry_after) = retry_after {
        body["parameters"] = json!({ "retry_after": retry_after });
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}

async fn handle_method(
    State(state): State<Arc<FakeState>>,
    Path((bot, method)): Path<(String, String)>,
    body: Bytes,
) -> Reply {
    if bot != format!("bot{}", TEST_TOKEN) {
        return failure(404, "Not Found", None);
    }

    let params: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => return failure(400, "Bad Request: invalid JSON", None),
        }
    };
    state.calls.lock().unwrap().push((method.clone(), params.clone()));

    let scripted = state
        .failures
        .lock()
        .unwrap()
        .get_mut(&method)
        .and_then(|queue| queue.pop_front());
    if let Some(f) = scripted {
        return failure(f.code, &f.description, f.retry_after);
    }

    match method.as_str() {
        "getMe" => ok(serde_json::to_value(&state.me).unwrap_or(Value::Null)),
        "deleteWebhook" => {
            if params["drop_pending_updates"].as_bool().unwrap_or(false) {
                state.updates.lock().unwrap().clear();
            }
            ok(Value::Bool(true))
        }
        "getUpdates" => get_updates(&state, &params).await,
        "sendMessage" => send_message(&state, params),
        _ => failure(404, "Not Found: method not found", None),
    }
}

async fn get_updates(state: &FakeState, params: &Value) -> Reply {
    let offset = params["offset"].as_i64();
    let limit = params["limit"].as_u64().unwrap_or(100) as usize;
    let wait = Duration::from_secs(params["timeout"].as_u64().unwrap_or(0));
    let deadline = Instant::now() + wait;

    loop {
        let batch: Vec<Update> = {
            let mut updates = state.updates.lock().unwrap();
            if let Some(offset) = offset {
                updates.retain(|u| u.update_id >= offset);
            }
            updates.iter().take(limit).cloned().collect()
        };

        let now = Instant::now();
        if !batch.is_empty() || now >= deadline {
            return ok(serde_json::to_value(batch).unwrap_or(Value::Null));
        }
        let _ = timeout(deadline - now, state.notify.notified()).await;
    }
}

fn send_message(state: &FakeState, params: Value) -> Reply {
    let request: SendMessageRequest = match serde_json::from_value(params) {
        Ok(request) => request,
        Err(e) => return failure(400, &format!("Bad Request: {}", e), None),
    };
    if request.text.is_empty() {
        return failure(400, "Bad Request: message text is empty", None);
    }

    let message = Message {
        message_id: state.next_message_id.fetch_add(1, Ordering::SeqCst),
        from: Some(state.me.clone()),
        chat: Chat {
            id: request.chat_id,
            kind: "private".to_string(),
            title: None,
            username: None,
        },
        date: 0,
        text: Some(request.text.clone()),
        entities: None,
    };
    state.sent.lock().unwrap().push(request);
    ok(serde_json::to_value(message).unwrap_or(Value::Null))
}
