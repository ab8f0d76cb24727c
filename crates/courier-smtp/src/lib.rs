//! # courier-smtp
//!
//! Async SMTP submission client used by Courier to deliver mail on behalf
//! of a configured mailbox.
//!
//! ## Features
//!
//! - **Type-state session**: the compiler rejects `MAIL FROM` before
//!   authentication and `DATA` before a recipient was accepted
//! - **Transport security**: STARTTLS upgrade (port 587) and implicit TLS
//!   (port 465) via `rustls`
//! - **Authentication**: SASL PLAIN, falling back to LOGIN when PLAIN is not
//!   advertised
//! - **Any byte stream**: sessions run over anything implementing
//!   `AsyncRead + AsyncWrite`, which keeps the dialogue testable
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::{Address, Client};
//! use courier_smtp::connection::connect;
//!
//! # async fn run() -> courier_smtp::Result<()> {
//! let stream = connect("smtp.example.com", 587).await?;
//! let client = Client::greet(stream).await?
//!     .ehlo("localhost").await?
//!     .starttls("smtp.example.com").await?;
//!
//! let client = client.authenticate("user@example.com", "secret").await?;
//! let client = client
//!     .send_mail(
//!         &Address::new("user@example.com")?,
//!         &[Address::new("friend@example.com")?],
//!         b"Subject: Hi\r\n\r\nHello\r\n",
//!     )
//!     .await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected ── authenticate() ──→ Authenticated ── mail_from() ──→ MailTransaction
//!                                      ↑                                 │ rcpt_to()
//!                                      │                                 ↓
//!                                      └──── send_message() ── Data ←── RecipientAdded
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, ServerInfo,
    SmtpStream,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
