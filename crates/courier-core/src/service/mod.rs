//! Services that talk to the outside world.

mod smtp;

pub use smtp::{
    MAX_ATTACHMENT_BYTES, MailTransport, Mailer, OutgoingEmail, Security, SendError,
    SmtpTransport, TransportError, TransportErrorKind,
};
