//! Error types for SMTP sessions.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that can end an SMTP session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket-level failure (connect, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The server answered with a non-success reply.
    #[error("server replied {code}: {message}")]
    Rejected {
        /// Three-digit reply code.
        code: u16,
        /// Reply text as sent by the server.
        message: String,
    },

    /// The server closed the connection mid-dialogue.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The server sent something that is not a well-formed reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Mailbox address failed syntax checks.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The server does not offer a required extension.
    #[error("server does not support {0}")]
    NotSupported(String),

    /// Message is larger than the server's advertised SIZE limit.
    #[error("message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Limit announced via the SIZE extension.
        limit: usize,
    },
}

impl Error {
    /// Builds a rejection from a reply code and text.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Reply code carried by a server rejection, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for 5xx rejections.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 500 && *code < 600)
    }

    /// True for 4xx rejections.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 400 && *code < 500)
    }

    /// True when the server refused the supplied credentials (RFC 4954).
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Rejected { code: 535 | 534 | 454, .. })
    }
}
