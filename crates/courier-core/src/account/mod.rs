//! Mailbox configuration: model types and encrypted storage.

mod model;
mod repository;

pub use model::{Credentials, MailboxConfig, Mode, UserId};
pub use repository::{ConfigError, ConfigStore, config_key};
