//! # courier-core
//!
//! Core logic of the Courier email bot.
//!
//! This crate provides:
//! - **Store** - key-value persistence (`SQLite` or in-memory)
//! - **Vault** - the process encryption key and AES-GCM sealing of secrets
//! - **Account** - per-user mailbox configuration with encrypted credentials
//! - **Setup** - the step-by-step configuration conversation
//! - **Service** - sending composed mail over SMTP
//! - **Stats** - usage counters
//! - **Bot** - chat event routing and per-user dispatch
//!
//! Components are built once into a [`Context`] and shared by reference;
//! nothing here relies on global state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod bot;
mod context;
mod error;
pub mod service;
pub mod setup;
pub mod stats;
pub mod store;
pub mod vault;

pub use account::{ConfigError, ConfigStore, Credentials, MailboxConfig, Mode, UserId};
pub use bot::{Bot, BotSettings, ChatError, ChatSink, Dispatcher, Event, Incoming, Reply};
pub use context::Context;
pub use error::{Error, Result};
pub use service::{
    MAX_ATTACHMENT_BYTES, MailTransport, Mailer, OutgoingEmail, Security, SendError,
    SmtpTransport, TransportError, TransportErrorKind,
};
pub use setup::{InputValidationError, Setup, SetupError, SetupOutcome, SetupState, SetupStep};
pub use stats::{Metric, Stats};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
pub use vault::{DecryptionError, EncryptionKey, KeyError, KeyManager};
