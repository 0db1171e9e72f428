pub mod config;
pub mod error;
pub mod secrets;
pub mod telegram;

pub use config::*;
pub use error::*;
pub use secrets::*;
pub use telegram::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_deserialize_ignores_unknown_fields() {
        let json = r#"{
            "update_id": 10,
            "message": {
                "message_id": 7,
                "from": {"id": 1, "is_bot": false, "first_name": "Ada", "language_code": "en"},
                "chat": {"id": 1, "type": "private", "first_name": "Ada"},
                "date": 1700000000,
                "text": "hello"
            }
        }"#;

        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 10);
        let message = update.effective_message().unwrap();
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.chat.kind, "private");
        assert!(!message.is_command());
    }

    #[test]
    fn test_command_detection_uses_entities() {
        let json = r#"{
            "message_id": 1,
            "chat": {"id": 5, "type": "group"},
            "date": 0,
            "text": "/start now",
            "entities": [{"type": "bot_command", "offset": 0, "length": 6}]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.is_command());

        let mention: Message = serde_json::from_str(
            r#"{"message_id": 2, "chat": {"id": 5, "type": "group"}, "date": 0,
                "text": "hi /start", "entities": [{"type": "bot_command", "offset": 3, "length": 6}]}"#,
        )
        .unwrap();
        assert!(!mention.is_command());
    }

    #[test]
    fn test_channel_post_is_effective_but_not_command_message() {
        let json = r#"{
            "update_id": 3,
            "channel_post": {"message_id": 1, "chat": {"id": -100, "type": "channel"}, "date": 0, "text": "/help"}
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert!(update.effective_message().is_some());
        assert!(update.command_message().is_none());
    }

    #[test]
    fn test_api_error_response() {
        let json = r#"{"ok": false, "error_code": 429, "description": "Too Many Requests: retry after 5",
                       "parameters": {"retry_after": 5}}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.parameters.unwrap().retry_after, Some(5));
    }

    #[test]
    fn test_send_message_omits_empty_reply() {
        let request = SendMessageRequest { chat_id: 9, text: "hi".into(), reply_to_message_id: None };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("reply_to_message_id").is_none());
    }
}
