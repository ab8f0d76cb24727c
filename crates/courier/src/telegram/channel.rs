//! Long-poll loop and the reply side of the bot.

use async_trait::async_trait;
use courier_core::bot::{Action, Button, Command, Document};
use courier_core::{
    ChatError, ChatSink, Dispatcher, Event, Incoming, MAX_ATTACHMENT_BYTES, Reply, UserId,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::{TelegramClient, TelegramError};
use super::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, User};

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed poll.
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram side of the bot: feeds updates to a [`Dispatcher`] and sends
/// replies through the Bot API.
#[derive(Debug)]
pub struct TelegramChannel {
    client: TelegramClient,
}

impl TelegramChannel {
    /// Wraps a client.
    #[must_use]
    pub const fn new(client: TelegramClient) -> Self {
        Self { client }
    }

    /// Polls forever, dispatching every usable update.
    pub async fn run(&self, dispatcher: &Dispatcher) {
        let mut offset = 0;
        info!("polling Telegram for updates");
        loop {
            match self.client.get_updates(offset, POLL_TIMEOUT).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update, dispatcher).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "polling failed; retrying");
                    tokio::time::sleep(ERROR_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update, dispatcher: &Dispatcher) {
        if let Some(query) = &update.callback_query
            && let Err(err) = self.client.answer_callback_query(&query.id).await
        {
            debug!(error = %err, "answerCallbackQuery failed");
        }

        if let Some(message) = &update.message
            && let Some(document) = &message.document
        {
            if let Some(user) = private_sender(message)
                && let Some(incoming) = self.fetch_document(user, document).await
            {
                dispatcher.dispatch(incoming);
            }
            return;
        }

        match translate(&update) {
            Some(incoming) => dispatcher.dispatch(incoming),
            None => debug!(update_id = update.update_id, "ignoring update"),
        }
    }

    async fn fetch_document(
        &self,
        user: &User,
        document: &super::types::Document,
    ) -> Option<Incoming> {
        let size = document.file_size.and_then(|s| usize::try_from(s).ok());
        if size.is_some_and(|s| s > MAX_ATTACHMENT_BYTES) {
            self.notify(
                user.id,
                &format!(
                    "❌ Attachments exceed the {} MB limit.",
                    MAX_ATTACHMENT_BYTES / (1024 * 1024)
                ),
            )
            .await;
            return None;
        }

        match self.download(&document.file_id).await {
            Ok(data) => Some(Incoming {
                user: UserId(user.id),
                first_name: Some(user.first_name.clone()),
                event: Event::Document(Document {
                    filename: document.file_name.clone(),
                    mime_type: document.mime_type.clone(),
                    data,
                }),
            }),
            Err(err) => {
                warn!(user = user.id, error = %err, "file download failed");
                self.notify(user.id, "❌ Could not download the file. Please try again.")
                    .await;
                None
            }
        }
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let file = self.client.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| TelegramError::Api("file is not available for download".into()))?;
        self.client.download_file(&path).await
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(err) = self.client.send_message(chat_id, text, None).await {
            warn!(chat_id, error = %err, "failed to send notice");
        }
    }
}

#[async_trait]
impl ChatSink for TelegramChannel {
    async fn respond(&self, user: UserId, reply: Reply) -> Result<(), ChatError> {
        self.client
            .send_message(user.0, &reply.text, keyboard(&reply.buttons))
            .await
            .map(drop)
            .map_err(|err| ChatError(err.to_string()))
    }

    async fn respond_with_file(
        &self,
        user: UserId,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<(), ChatError> {
        self.client
            .send_document(user.0, filename, data)
            .await
            .map(drop)
            .map_err(|err| ChatError(err.to_string()))
    }
}

/// Sender of a message in a private chat with a human.
fn private_sender(message: &Message) -> Option<&User> {
    message
        .from
        .as_ref()
        .filter(|user| !user.is_bot && message.chat.is_private() && message.chat.id == user.id)
}

/// Maps a text message or button press to a bot event. Documents are
/// handled separately because they need a download first.
fn translate(update: &Update) -> Option<Incoming> {
    if let Some(query) = &update.callback_query {
        if query.from.is_bot {
            return None;
        }
        let action = query.data.as_deref().and_then(Action::from_payload)?;
        return Some(Incoming {
            user: UserId(query.from.id),
            first_name: Some(query.from.first_name.clone()),
            event: Event::Button(action),
        });
    }

    let message = update.message.as_ref()?;
    let user = private_sender(message)?;
    let text = message.text.as_deref()?;
    let event = Command::parse(text).map_or_else(|| Event::Text(text.to_owned()), Event::Command);
    Some(Incoming {
        user: UserId(user.id),
        first_name: Some(user.first_name.clone()),
        event,
    })
}

fn keyboard(rows: &[Vec<Button>]) -> Option<InlineKeyboardMarkup> {
    if rows.is_empty() {
        return None;
    }
    Some(InlineKeyboardMarkup {
        inline_keyboard: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| InlineKeyboardButton {
                        text: button.label.clone(),
                        callback_data: button.action.payload().to_owned(),
                    })
                    .collect()
            })
            .collect(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    fn text_update(text: &str, chat_type: &str) -> Update {
        update(&format!(
            r#"{{"update_id":1,"message":{{"message_id":1,
                "from":{{"id":42,"first_name":"Ada"}},
                "chat":{{"id":42,"type":"{chat_type}"}},"text":{text:?}}}}}"#
        ))
    }

    #[test]
    fn commands_and_text() {
        let incoming = translate(&text_update("/start", "private")).unwrap();
        assert_eq!(incoming.user, UserId(42));
        assert_eq!(incoming.first_name.as_deref(), Some("Ada"));
        assert_eq!(incoming.event, Event::Command(Command::Start));

        let incoming = translate(&text_update("/send@courier_bot", "private")).unwrap();
        assert_eq!(incoming.event, Event::Command(Command::Send));

        let incoming = translate(&text_update("smtp.gmail.com", "private")).unwrap();
        assert_eq!(incoming.event, Event::Text("smtp.gmail.com".into()));

        let incoming = translate(&text_update("/unknown", "private")).unwrap();
        assert_eq!(incoming.event, Event::Text("/unknown".into()));
    }

    #[test]
    fn group_messages_are_ignored() {
        assert!(translate(&text_update("/start", "group")).is_none());
    }

    #[test]
    fn button_presses() {
        let incoming = translate(&update(
            r#"{"update_id":2,"callback_query":{"id":"q","from":{"id":7,"first_name":"Bo"},
                "data":"compose_send"}}"#,
        ))
        .unwrap();
        assert_eq!(incoming.user, UserId(7));
        assert_eq!(incoming.event, Event::Button(Action::ComposeSend));

        assert!(
            translate(&update(
                r#"{"update_id":3,"callback_query":{"id":"q","from":{"id":7,"first_name":"Bo"},
                    "data":"bogus"}}"#,
            ))
            .is_none()
        );
    }

    #[test]
    fn keyboard_carries_payloads() {
        assert!(keyboard(&[]).is_none());
        let markup = keyboard(&[
            vec![Button::new("Configure Email", Action::Configure)],
            vec![
                Button::new("Send", Action::ComposeSend),
                Button::new("Cancel", Action::Cancel),
            ],
        ])
        .unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].callback_data, "configure");
        assert_eq!(markup.inline_keyboard[1][1].text, "Cancel");
        assert_eq!(markup.inline_keyboard[1][1].callback_data, "cancel");
    }
}
