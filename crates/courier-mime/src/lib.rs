//! # courier-mime
//!
//! Builds the outgoing messages Courier hands to SMTP.
//!
//! Every message is `multipart/mixed`: a UTF-8 `text/plain` part encoded
//! as quoted-printable, then one base64 part per attachment. Header values
//! that are not plain ASCII are written as RFC 2047 encoded words.
//!
//! ```ignore
//! use courier_mime::{Attachment, MessageBuilder};
//!
//! let message = MessageBuilder::new()
//!     .from("a@example.com")
//!     .to("b@example.com")
//!     .subject("Report")
//!     .text("See attached.")
//!     .attach(Attachment::new("report.pdf", pdf_bytes)?)
//!     .build()?;
//!
//! let wire: Vec<u8> = message.to_bytes();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;

pub mod encoding;

pub use builder::{Attachment, Message, MessageBuilder};
pub use content_type::ContentType;
pub use error::{Error, Result};
