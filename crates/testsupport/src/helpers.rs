use bot_models::{Chat, Message, MessageEntity, Update, User};

pub fn user(id: i64, first_name: &str) -> User {
    User {
        id,
        is_bot: false,
        first_name: first_name.to_string(),
        last_name: None,
        username: Some(first_name.to_lowercase()),
    }
}

pub fn private_chat(id: i64) -> Chat {
    Chat {
        id,
        kind: "private".to_string(),
        title: None,
        username: None,
    }
}

/// A chat message as the Bot API would send it, with a `bot_command`
/// entity when the text starts with a slash.
pub fn text_message(message_id: i64, chat_id: i64, text: &str) -> Message {
    let entities = text.starts_with('/').then(|| {
        let length = text.split_whitespace().next().map(|w| w.chars().count()).unwrap_or(0);
        vec![MessageEntity {
            kind: "bot_command".to_string(),
            offset: 0,
            length,
        }]
    });

    Message {
        message_id,
        from: Some(user(chat_id, "Ada")),
        chat: private_chat(chat_id),
        date: 1_700_000_000,
        text: Some(text.to_string()),
        entities,
    }
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(text_message(update_id, chat_id, text)),
        edited_message: None,
        channel_post: None,
        edited_channel_post: None,
    }
}

pub fn edited_text_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: None,
        edited_message: Some(text_message(update_id, chat_id, text)),
        channel_post: None,
        edited_channel_post: None,
    }
}

pub fn channel_post_update(update_id: i64, chat_id: i64, text: &str) -> Update {
    let mut post = text_message(update_id, chat_id, text);
    post.from = None;
    post.chat = Chat {
        id: chat_id,
        kind: "channel".to_string(),
        title: Some("News".to_string()),
        username: None,
    };
    Update {
        update_id,
        message: None,
        edited_message: None,
        channel_post: Some(post),
        edited_channel_post: None,
    }
}

/// A message without text, e.g. a sticker or photo.
pub fn non_text_update(update_id: i64, chat_id: i64) -> Update {
    let mut message = text_message(update_id, chat_id, "");
    message.text = None;
    message.entities = None;
    Update {
        update_id,
        message: Some(message),
        edited_message: None,
        channel_post: None,
        edited_channel_post: None,
    }
}

/// Scratch directory holding the lock, persistence and log files of one test.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create scratch dir")
}
