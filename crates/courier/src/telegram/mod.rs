//! Telegram Bot API front end.
//!
//! [`TelegramClient`] speaks the HTTP API, [`TelegramChannel`] long-polls for
//! updates, turns them into bot events and implements the reply side.

mod channel;
mod client;
mod types;

pub use channel::TelegramChannel;
pub use client::TelegramClient;
