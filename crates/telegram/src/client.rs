use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bot_models::{
    ApiResponse, BotError, BotToken, DeleteWebhookParams, EmptyParams, GetUpdatesParams, Message,
    ResponseParameters, SendMessageRequest, TelegramConfig, Update, User,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::api::BotApi;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 200;

/// HTTP implementation of [`BotApi`].
///
/// The endpoint embeds the token, so it is never logged and transport errors
/// are stripped of their URL before they leave this module.
pub struct TelegramClient {
    http: Client,
    endpoint: String,
    request_timeout: Duration,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &BotToken) -> Result<Self, BotError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BotError::Internal { reason: e.without_url().to_string() })?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token.expose()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, BotError>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(method, status, bytes = body.len(), "Bot API call completed");

        decode_response(method, status, &body)
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    #[instrument(skip(self))]
    async fn get_me(&self) -> Result<User, BotError> {
        self.call("getMe", &EmptyParams::default(), self.request_timeout).await
    }

    #[instrument(skip(self))]
    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, BotError> {
        let params = DeleteWebhookParams { drop_pending_updates };
        self.call("deleteWebhook", &params, self.request_timeout).await
    }

    #[instrument(skip(self, params), fields(offset = ?params.offset, timeout = params.timeout))]
    async fn get_updates(&self, params: &GetUpdatesParams) -> Result<Vec<Update>, BotError> {
        // The server holds the request for up to `timeout` seconds.
        let timeout = Duration::from_secs(params.timeout) + self.request_timeout;
        self.call("getUpdates", params, timeout).await
    }

    #[instrument(skip(self, request), fields(chat_id = request.chat_id))]
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, BotError> {
        self.call("sendMessage", request, self.request_timeout).await
    }
}

fn transport_error(error: reqwest::Error) -> BotError {
    let error = error.without_url();
    if error.is_timeout() {
        BotError::Network { reason: format!("request timed out: {}", error) }
    } else if error.is_decode() {
        BotError::Decode { reason: error.to_string() }
    } else {
        BotError::Network { reason: error.to_string() }
    }
}

/// Turns a Bot API body into a result. Error bodies are JSON too, so the
/// envelope is decoded before the HTTP status is consulted.
pub fn decode_response<R: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &[u8],
) -> Result<R, BotError> {
    match serde_json::from_slice::<ApiResponse<R>>(body) {
        Ok(ApiResponse { ok: true, result: Some(result), .. }) => Ok(result),
        Ok(ApiResponse { ok: true, result: None, .. }) => Err(BotError::Decode {
            reason: format!("{}: ok response without result", method),
        }),
        Ok(response) => Err(api_error(
            response.error_code.unwrap_or(i64::from(status)),
            response.description.unwrap_or_default(),
            response.parameters,
        )),
        Err(_) if !(200..300).contains(&status) => Err(api_error(
            i64::from(status),
            String::from_utf8_lossy(body).chars().take(MAX_ERROR_BODY).collect(),
            None,
        )),
        Err(e) => Err(BotError::Decode { reason: format!("{}: {}", method, e) }),
    }
}

/// 404 is how the Bot API answers a token it does not know.
pub fn api_error(code: i64, description: String, parameters: Option<ResponseParameters>) -> BotError {
    match code {
        401 | 404 => BotError::Unauthorized,
        409 => BotError::Conflict { description },
        429 => BotError::RateLimited {
            retry_after: parameters.and_then(|p| p.retry_after).unwrap_or(1),
        },
        _ => BotError::Api { code, description },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_successful_result() {
        let body = br#"{"ok":true,"result":true,"description":"Webhook was deleted"}"#;
        let deleted: bool = decode_response("deleteWebhook", 200, body).unwrap();
        assert!(deleted);
    }

    #[test]
    fn maps_conflict() {
        let body = br#"{"ok":false,"error_code":409,"description":"Conflict: terminated by other getUpdates request"}"#;
        let err = decode_response::<Vec<Update>>("getUpdates", 409, body).unwrap_err();
        assert!(matches!(err, BotError::Conflict { ref description } if description.contains("getUpdates")));
    }

    #[test]
    fn maps_rate_limit_with_retry_after() {
        let body = br#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#;
        let err = decode_response::<Message>("sendMessage", 429, body).unwrap_err();
        assert!(matches!(err, BotError::RateLimited { retry_after: 7 }));
    }

    #[test]
    fn non_json_gateway_error_keeps_status() {
        let err = decode_response::<User>("getMe", 502, b"<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, BotError::Api { code: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn garbage_success_is_decode_error() {
        let err = decode_response::<User>("getMe", 200, b"not json").unwrap_err();
        assert!(matches!(err, BotError::Decode { .. }));
    }

    #[test]
    fn debug_does_not_reveal_endpoint() {
        let token = BotToken::parse("42:SECRETsecretSECRET").unwrap();
        let client = TelegramClient::new(&TelegramConfig::default(), &token).unwrap();
        assert!(!format!("{:?}", client).contains("SECRET"));
    }
}
