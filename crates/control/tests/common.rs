#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bot_control::{Dispatcher, Persistence};
use bot_metrics::MetricsService;
use bot_models::{BotError, Chat, Config, GetUpdatesParams, Message, SendMessageRequest, Update, User};
use bot_telegram::BotApi;

/// Scripted in-memory Bot API.
pub struct MockApi {
    pub poll_script: Mutex<VecDeque<Result<Vec<Update>, BotError>>>,
    pub send_failures: Mutex<VecDeque<BotError>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub polls: Mutex<Vec<GetUpdatesParams>>,
    /// When the script runs dry: park forever instead of returning empty batches.
    pub block_when_idle: bool,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    pub fn blocking() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(block_when_idle: bool) -> Self {
        Self {
            poll_script: Mutex::new(VecDeque::new()),
            send_failures: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            block_when_idle,
        }
    }

    pub fn script_poll(&self, result: Result<Vec<Update>, BotError>) {
        self.poll_script.lock().unwrap().push_back(result);
    }

    pub fn fail_send(&self, error: BotError) {
        self.send_failures.lock().unwrap().push_back(error);
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|r| r.text.clone()).collect()
    }

    pub fn polls(&self) -> Vec<GetUpdatesParams> {
        self.polls.lock().unwrap().clone()
    }

    pub async fn wait_for_sent(&self, count: usize) {
        for _ in 0..1000 {
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} sent messages, got {:?}", count, self.sent_texts());
    }
}

#[async_trait]
impl BotApi for MockApi {
    async fn get_me(&self) -> Result<User, BotError> {
        Ok(User {
            id: 1,
            is_bot: true,
            first_name: "Echo".into(),
            last_name: None,
            username: Some("echo_bot".into()),
        })
    }

    async fn delete_webhook(&self, _drop_pending_updates: bool) -> Result<bool, BotError> {
        Ok(true)
    }

    async fn get_updates(&self, params: &GetUpdatesParams) -> Result<Vec<Update>, BotError> {
        self.polls.lock().unwrap().push(params.clone());
        let next = self.poll_script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None if self.block_when_idle && params.timeout > 0 => std::future::pending().await,
            None => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, BotError> {
        let failure = self.send_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        Ok(Message {
            message_id: 500 + sent.len() as i64,
            from: None,
            chat: Chat { id: request.chat_id, kind: "private".into(), title: None, username: None },
            date: 0,
            text: Some(request.text.clone()),
            entities: None,
        })
    }
}

pub struct Harness {
    pub api: Arc<MockApi>,
    pub dispatcher: Arc<Dispatcher>,
    pub persistence: Arc<Persistence>,
    pub metrics: Arc<MetricsService>,
    pub config: Config,
}

pub fn harness_with(api: Arc<MockApi>, config: Config) -> Harness {
    let persistence = Arc::new(Persistence::in_memory());
    let metrics = Arc::new(MetricsService::new().unwrap());
    let dispatcher = Arc::new(
        Dispatcher::new(api.clone(), &config, persistence.clone(), metrics.clone())
            .with_bot_username(Some("echo_bot".into())),
    );
    Harness { api, dispatcher, persistence, metrics, config }
}

pub fn harness() -> Harness {
    harness_with(MockApi::new(), Config::default())
}
