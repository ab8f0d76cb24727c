//! Chat conversation layer.
//!
//! A chat adapter turns platform updates into [`Incoming`] events and hands
//! them to a [`Dispatcher`]. Replies go back out through a [`ChatSink`].

mod compose;
mod dispatcher;
mod handler;

pub use compose::{ComposeDraft, ComposeError, ComposeStep};
pub use dispatcher::Dispatcher;
pub use handler::{Bot, BotSettings};

use async_trait::async_trait;
use crate::account::UserId;

/// Slash commands understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Welcome screen.
    Start,
    /// Begin mailbox setup.
    Configure,
    /// Begin composing an email.
    Send,
    /// Abandon the current flow.
    Cancel,
    /// Usage help.
    Help,
    /// Admin: download the log file.
    Logs,
    /// Admin: usage statistics.
    Users,
}

impl Command {
    /// Parses `/name`, `/name@botname` and `/name args`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or(word);
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "configure" => Self::Configure,
            "send" => Self::Send,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            "logs" => Self::Logs,
            "users" => Self::Users,
            _ => return None,
        })
    }
}

/// Inline button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start mailbox setup.
    Configure,
    /// Start composing.
    SendEmail,
    /// Inbox placeholder.
    CheckInbox,
    /// Usage help.
    Help,
    /// Send the composed draft.
    ComposeSend,
    /// Abandon the current flow.
    Cancel,
}

impl Action {
    /// Callback payload carried by the button.
    #[must_use]
    pub const fn payload(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::SendEmail => "send_email",
            Self::CheckInbox => "check_inbox",
            Self::Help => "help",
            Self::ComposeSend => "compose_send",
            Self::Cancel => "cancel",
        }
    }

    /// Reverses [`payload`](Self::payload).
    #[must_use]
    pub fn from_payload(payload: &str) -> Option<Self> {
        Some(match payload {
            "configure" => Self::Configure,
            "send_email" => Self::SendEmail,
            "check_inbox" => Self::CheckInbox,
            "help" => Self::Help,
            "compose_send" => Self::ComposeSend,
            "cancel" => Self::Cancel,
            _ => return None,
        })
    }
}

/// A file uploaded by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Original file name, if the platform supplied one.
    pub filename: Option<String>,
    /// Declared MIME type.
    pub mime_type: Option<String>,
    /// File contents.
    pub data: Vec<u8>,
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A slash command.
    Command(Command),
    /// Free text.
    Text(String),
    /// An inline button press.
    Button(Action),
    /// An uploaded file.
    Document(Document),
}

impl Event {
    /// Short name for logs. Never includes user content.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Text(_) => "text",
            Self::Button(_) => "button",
            Self::Document(_) => "document",
        }
    }
}

/// An event together with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    /// Sender.
    pub user: UserId,
    /// Sender's display name, used in greetings.
    pub first_name: Option<String>,
    /// The event itself.
    pub event: Event,
}

impl Incoming {
    /// Creates an event without a display name.
    #[must_use]
    pub const fn new(user: UserId, event: Event) -> Self {
        Self {
            user,
            first_name: None,
            event,
        }
    }
}

/// An inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the user.
    pub label: String,
    /// Action triggered on press.
    pub action: Action,
}

impl Button {
    /// Creates a button.
    #[must_use]
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// A message to the user with optional button rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Message text.
    pub text: String,
    /// Button rows, top to bottom.
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    /// Text-only reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// Appends a row of buttons.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.buttons.push(row);
        self
    }
}

/// Failure delivering a reply to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chat delivery failed: {0}")]
pub struct ChatError(pub String);

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Sends a message.
    async fn respond(&self, user: UserId, reply: Reply) -> Result<(), ChatError>;

    /// Sends a file.
    async fn respond_with_file(
        &self,
        user: UserId,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<(), ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /Configure "), Some(Command::Configure));
        assert_eq!(Command::parse("/send@courier_bot"), Some(Command::Send));
        assert_eq!(Command::parse("/users extra"), Some(Command::Users));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn payloads_round_trip() {
        for action in [
            Action::Configure,
            Action::SendEmail,
            Action::CheckInbox,
            Action::Help,
            Action::ComposeSend,
            Action::Cancel,
        ] {
            assert_eq!(Action::from_payload(action.payload()), Some(action));
        }
        assert_eq!(Action::from_payload("nope"), None);
    }
}
