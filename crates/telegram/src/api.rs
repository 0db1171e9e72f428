use async_trait::async_trait;
use bot_models::{BotError, GetUpdatesParams, Message, SendMessageRequest, Update, User};

/// The subset of the Bot API the bot speaks. Implemented over HTTP by
/// [`crate::TelegramClient`]; tests substitute their own.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_me(&self) -> Result<User, BotError>;

    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, BotError>;

    async fn get_updates(&self, params: &GetUpdatesParams) -> Result<Vec<Update>, BotError>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, BotError>;
}
