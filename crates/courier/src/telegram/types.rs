//! Wire types for the subset of the Bot API the bot uses.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramResponse<T> {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Payload on success.
    pub result: Option<T>,
    /// Error text on failure.
    pub description: Option<String>,
}

/// One entry from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id, used as the poll offset.
    pub update_id: i64,
    /// New message, if this update carries one.
    pub message: Option<Message>,
    /// Inline button press.
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Sender; absent for channel posts.
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Text content.
    pub text: Option<String>,
    /// Attached file.
    pub document: Option<Document>,
}

/// A Telegram user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// True for bots.
    #[serde(default)]
    pub is_bot: bool,
    /// Given name.
    pub first_name: String,
}

/// A chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat id. Equals the user id in private chats.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl Chat {
    /// True for one-to-one chats with the bot.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.chat_type == "private"
    }
}

/// Inline keyboard press.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Id to acknowledge with `answerCallbackQuery`.
    pub id: String,
    /// Who pressed the button.
    pub from: User,
    /// The button's callback data.
    pub data: Option<String>,
}

/// File metadata attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// Id for `getFile`.
    pub file_id: String,
    /// Name given by the sender.
    pub file_name: Option<String>,
    /// MIME type given by the sender.
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub file_size: Option<u64>,
}

/// Result of `getFile`.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    /// Download path under the file endpoint.
    pub file_path: Option<String>,
}

/// Body of `getUpdates`.
#[derive(Debug, Clone, Serialize)]
pub struct GetUpdatesRequest {
    /// First update id to return.
    pub offset: i64,
    /// Long-poll timeout in seconds.
    pub timeout: u64,
    /// Update kinds to receive.
    pub allowed_updates: Vec<&'static str>,
}

/// Body of `sendMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    /// Target chat.
    pub chat_id: i64,
    /// Message text.
    pub text: String,
    /// Inline keyboard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Inline keyboard attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Button rows.
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// A button in an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    /// Label.
    pub text: String,
    /// Data sent back in the callback query.
    pub callback_data: String,
}

/// Body of `answerCallbackQuery`.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCallbackQueryRequest {
    /// Query being acknowledged.
    pub callback_query_id: String,
}

/// Body of `getFile`.
#[derive(Debug, Clone, Serialize)]
pub struct GetFileRequest {
    /// File to resolve.
    pub file_id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_text_update() {
        let json = r#"{
            "update_id": 100,
            "message": {
                "message_id": 7,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 42, "type": "private"},
                "date": 1700000000,
                "text": "/start"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 100);
        let message = update.message.unwrap();
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert_eq!(message.from.unwrap().first_name, "Ada");
        assert!(message.chat.is_private());
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn deserialize_callback_query() {
        let json = r#"{
            "update_id": 101,
            "callback_query": {
                "id": "cbq-1",
                "from": {"id": 42, "first_name": "Ada"},
                "chat_instance": "x",
                "data": "configure"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.id, "cbq-1");
        assert_eq!(query.data.as_deref(), Some("configure"));
        assert!(!query.from.is_bot);
    }

    #[test]
    fn deserialize_document() {
        let json = r#"{
            "message_id": 8,
            "from": {"id": 42, "first_name": "Ada"},
            "chat": {"id": 42, "type": "private"},
            "document": {"file_id": "F1", "file_unique_id": "u", "file_name": "a.pdf",
                         "mime_type": "application/pdf", "file_size": 1234}
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        let doc = message.document.unwrap();
        assert_eq!(doc.file_id, "F1");
        assert_eq!(doc.file_name.as_deref(), Some("a.pdf"));
        assert_eq!(doc.file_size, Some(1234));
    }

    #[test]
    fn deserialize_error_response() {
        let json = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let resp: TelegramResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn serialize_message_with_keyboard() {
        let request = SendMessageRequest {
            chat_id: 42,
            text: "hi".into(),
            reply_markup: Some(InlineKeyboardMarkup {
                inline_keyboard: vec![vec![InlineKeyboardButton {
                    text: "Help".into(),
                    callback_data: "help".into(),
                }]],
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chat_id"], 42);
        assert_eq!(json["reply_markup"]["inline_keyboard"][0][0]["callback_data"], "help");
    }

    #[test]
    fn serialize_message_without_keyboard_omits_markup() {
        let request = SendMessageRequest {
            chat_id: 1,
            text: "x".into(),
            reply_markup: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("reply_markup"));
    }
}
