//! Error types for the core library.

use thiserror::Error;

/// Any failure surfaced by the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// Encryption key could not be loaded or used.
    #[error(transparent)]
    Key(#[from] crate::vault::KeyError),

    /// Mailbox configuration could not be read or written.
    #[error(transparent)]
    Config(#[from] crate::account::ConfigError),

    /// Setup step failed.
    #[error(transparent)]
    Setup(#[from] crate::setup::SetupError),

    /// Email could not be sent.
    #[error(transparent)]
    Send(#[from] crate::service::SendError),

    /// Reply could not be delivered to the chat.
    #[error(transparent)]
    Chat(#[from] crate::bot::ChatError),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short description safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Send(err) => err.user_message(),
            Self::Setup(crate::setup::SetupError::Incomplete { .. }) => {
                "Some settings are missing. Please start again with /configure.".into()
            }
            Self::Setup(crate::setup::SetupError::Abandoned) => {
                "Your setup session could not be read. Please start again with /configure.".into()
            }
            Self::Setup(crate::setup::SetupError::Commit(_)) => {
                "Could not save your configuration. Send the password again to retry.".into()
            }
            Self::Config(crate::account::ConfigError::Decryption(_)) => {
                "Stored credentials can no longer be read. Please /configure again.".into()
            }
            Self::Io(_) => "Could not read the requested file.".into(),
            _ => "Something went wrong. Please try again later.".into(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
