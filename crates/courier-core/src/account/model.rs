//! Mailbox configuration types.

use std::fmt;

/// Chat platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl UserId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a stored configuration is complete enough to send mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Record exists but setup never finished.
    #[default]
    Unset,
    /// All fields were supplied through setup.
    Configured,
}

impl Mode {
    /// Storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Configured => "configured",
        }
    }

    /// Parses the storage form; anything unknown is [`Mode::Unset`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("configured") {
            Self::Configured
        } else {
            Self::Unset
        }
    }
}

/// Mailbox login. `Debug` never prints either field.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Mailbox address, also the SMTP login.
    pub email: String,
    /// Mailbox password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One user's mailbox settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    /// SMTP host.
    pub smtp_server: String,
    /// SMTP port.
    pub smtp_port: u16,
    /// IMAP host, kept for a future inbox feature.
    pub imap_server: String,
    /// IMAP port.
    pub imap_port: u16,
    /// Decrypted login.
    pub credentials: Credentials,
    /// Completion marker.
    pub mode: Mode,
}

impl MailboxConfig {
    /// True when the record can be used to send mail.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.mode == Mode::Configured && !self.smtp_server.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailboxConfig {
        MailboxConfig {
            smtp_server: "smtp.example.com".into(),
            smtp_port: 587,
            imap_server: "imap.example.com".into(),
            imap_port: 993,
            credentials: Credentials::new("a@example.com", "secret"),
            mode: Mode::Configured,
        }
    }

    #[test]
    fn debug_hides_credentials() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("a@example.com"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("smtp.example.com"));
    }

    #[test]
    fn mode_storage_form() {
        assert_eq!(Mode::parse("configured"), Mode::Configured);
        assert_eq!(Mode::parse(""), Mode::Unset);
        assert_eq!(Mode::parse("bogus"), Mode::Unset);
        assert_eq!(Mode::parse(Mode::Configured.as_str()), Mode::Configured);
    }

    #[test]
    fn sendable_requires_mode_and_server() {
        assert!(config().is_sendable());
        let mut unset = config();
        unset.mode = Mode::Unset;
        assert!(!unset.is_sendable());
        let mut blank = config();
        blank.smtp_server = " ".into();
        assert!(!blank.is_sendable());
    }
}
