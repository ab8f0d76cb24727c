//! Client commands and their wire form.

use crate::types::{Address, AuthMechanism};

/// A command sent by the client.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <domain>`
    Ehlo {
        /// Name the client announces itself as.
        domain: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism> [initial-response]`
    Auth {
        /// SASL mechanism.
        mechanism: AuthMechanism,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// A bare base64 line answering a `334` challenge.
    AuthResponse(String),
    /// `MAIL FROM:<addr> [SIZE=n]`
    MailFrom {
        /// Envelope sender.
        from: Address,
        /// Declared message size, sent when the server supports SIZE.
        size: Option<usize>,
    },
    /// `RCPT TO:<addr>`
    RcptTo {
        /// Envelope recipient.
        to: Address,
    },
    /// `DATA`
    Data,
    /// `RSET`
    Rset,
    /// `QUIT`
    Quit,
}

impl Command {
    /// Serializes the command, including the trailing CRLF.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Ehlo { domain } => format!("EHLO {domain}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(response),
            } => format!("AUTH {} {response}", mechanism.as_str()),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from, size: None } => format!("MAIL FROM:<{from}>"),
            Self::MailFrom {
                from,
                size: Some(size),
            } => format!("MAIL FROM:<{from}> SIZE={size}"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
        .into_bytes();
        line.extend_from_slice(b"\r\n");
        line
    }

    /// Command keyword for logging; never includes credentials.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse(_) => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}

// Auth payloads carry base64 credentials, so Debug only shows the verb.
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth { mechanism, .. } => write!(f, "Auth({})", mechanism.as_str()),
            Self::AuthResponse(_) => f.write_str("AuthResponse(<redacted>)"),
            Self::MailFrom { from, size } => f
                .debug_struct("MailFrom")
                .field("from", from)
                .field("size", size)
                .finish(),
            Self::RcptTo { to } => f.debug_struct("RcptTo").field("to", to).finish(),
            Self::Ehlo { domain } => f.debug_struct("Ehlo").field("domain", domain).finish(),
            other => f.write_str(other.verb()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn simple_verbs() {
        assert_eq!(Command::StartTls.to_bytes(), b"STARTTLS\r\n");
        assert_eq!(Command::Data.to_bytes(), b"DATA\r\n");
        assert_eq!(Command::Rset.to_bytes(), b"RSET\r\n");
        assert_eq!(Command::Quit.to_bytes(), b"QUIT\r\n");
    }

    #[test]
    fn ehlo() {
        let cmd = Command::Ehlo {
            domain: "localhost".to_string(),
        };
        assert_eq!(cmd.to_bytes(), b"EHLO localhost\r\n");
    }

    #[test]
    fn auth_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.to_bytes(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn mail_from_with_size() {
        let cmd = Command::MailFrom {
            from: Address::new("a@example.com").unwrap(),
            size: Some(1024),
        };
        assert_eq!(cmd.to_bytes(), b"MAIL FROM:<a@example.com> SIZE=1024\r\n");
    }

    #[test]
    fn rcpt_to() {
        let cmd = Command::RcptTo {
            to: Address::new("b@example.com").unwrap(),
        };
        assert_eq!(cmd.to_bytes(), b"RCPT TO:<b@example.com>\r\n");
    }

    #[test]
    fn debug_hides_credentials() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert!(!format!("{cmd:?}").contains("AHVz"));
        let cmd = Command::AuthResponse("c2VjcmV0".to_string());
        assert!(!format!("{cmd:?}").contains("c2Vj"));
    }
}
