//! Sending mail through a user's configured SMTP server.

use async_trait::async_trait;
use courier_mime::{Attachment, MessageBuilder};
use courier_smtp::connection::connect;
use courier_smtp::{Address, Client};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::account::{ConfigError, ConfigStore, MailboxConfig, UserId};
use crate::stats::{Metric, Stats};

/// Largest total attachment size accepted for one message.
pub const MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

/// A message composed by a user.
#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    /// Recipient, or several separated by commas.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Attached files.
    pub attachments: Vec<Attachment>,
}

impl OutgoingEmail {
    /// Creates a message without attachments.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Total raw attachment size.
    #[must_use]
    pub fn attachment_bytes(&self) -> usize {
        self.attachments.iter().map(Attachment::len).sum()
    }

    fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Broad class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// TCP connect failed, timed out, or the connection dropped.
    Connect,
    /// TLS handshake or STARTTLS upgrade failed.
    Tls,
    /// The server refused the credentials.
    Auth,
    /// The server refused the sender, a recipient, or the message.
    Rejected,
    /// The server broke the protocol.
    Protocol,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connection failed",
            Self::Tls => "TLS failed",
            Self::Auth => "authentication failed",
            Self::Rejected => "rejected by server",
            Self::Protocol => "protocol error",
        })
    }
}

/// Failure while talking to the mail server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    /// Failure class.
    pub kind: TransportErrorKind,
    /// Server or socket detail, for logs.
    pub detail: String,
}

impl TransportError {
    /// Creates a transport error.
    #[must_use]
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Why a send did not happen.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The user has no usable mailbox configuration.
    #[error("SMTP not configured")]
    NotConfigured,

    /// Attachments exceed [`MAX_ATTACHMENT_BYTES`].
    #[error("attachments total {size} bytes, limit is {limit}")]
    AttachmentTooLarge {
        /// Total attachment size.
        size: usize,
        /// Allowed maximum.
        limit: usize,
    },

    /// Sender or recipient address is malformed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The message could not be built.
    #[error("message build failed: {0}")]
    Message(#[from] courier_mime::Error),

    /// The mail server session failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SendError {
    /// Short description safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured => "Email is not configured. Use /configure first.".into(),
            Self::AttachmentTooLarge { .. } => {
                format!("Attachments exceed the {} MB limit.", MAX_ATTACHMENT_BYTES / (1024 * 1024))
            }
            Self::InvalidAddress(addr) => format!("Invalid email address: {addr}"),
            Self::Config(ConfigError::Decryption(_)) => {
                "Stored credentials can no longer be read. Please /configure again.".into()
            }
            Self::Config(_) => "Could not load your configuration. Try again later.".into(),
            Self::Message(_) => "Could not build the message.".into(),
            Self::Transport(err) => match err.kind {
                TransportErrorKind::Connect => "Could not reach the mail server.".into(),
                TransportErrorKind::Tls => "Secure connection to the mail server failed.".into(),
                TransportErrorKind::Auth => {
                    "The mail server rejected your login. Check your email and password.".into()
                }
                TransportErrorKind::Rejected => "The mail server refused the message.".into(),
                TransportErrorKind::Protocol => {
                    "The mail server sent an unexpected reply.".into()
                }
            },
        }
    }
}

/// Transport security for an SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext session. Only for local relays.
    None,
    /// Implicit TLS from the first byte.
    Tls,
    /// Plaintext connect upgraded with STARTTLS.
    #[default]
    StartTls,
}

impl Security {
    /// Security implied by a submission port: implicit TLS on 465,
    /// STARTTLS everywhere else.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Tls,
            _ => Self::StartTls,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// Delivers a rendered message using a mailbox's SMTP settings.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Runs one complete submission session.
    async fn deliver(
        &self,
        config: &MailboxConfig,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    Tls,
    Auth,
    Send,
}

fn classify(stage: Stage, err: &courier_smtp::Error) -> TransportErrorKind {
    use courier_smtp::Error as E;

    match err {
        E::Tls(_) => TransportErrorKind::Tls,
        _ if stage == Stage::Tls => TransportErrorKind::Tls,
        E::Rejected { .. } | E::NotSupported(_) if stage == Stage::Auth => TransportErrorKind::Auth,
        E::Rejected { .. } if err.is_auth_failure() => TransportErrorKind::Auth,
        E::Rejected { .. } | E::MessageTooLarge { .. } | E::InvalidAddress(_) => {
            TransportErrorKind::Rejected
        }
        E::Protocol(_) | E::NotSupported(_) => TransportErrorKind::Protocol,
        E::Io(_) | E::ConnectionClosed => TransportErrorKind::Connect,
    }
}

fn at(stage: Stage) -> impl Fn(courier_smtp::Error) -> TransportError {
    move |err| TransportError::new(classify(stage, &err), err.to_string())
}

/// [`MailTransport`] speaking SMTP over TCP.
///
/// Security follows the configured port (implicit TLS on 465, STARTTLS
/// otherwise) unless overridden.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    security: Option<Security>,
    local_domain: String,
    timeout: Duration,
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtpTransport {
    /// Transport choosing security from the port.
    #[must_use]
    pub fn new() -> Self {
        Self {
            security: None,
            local_domain: "localhost".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Transport that never encrypts. Only for local test relays.
    #[must_use]
    pub fn plaintext() -> Self {
        Self {
            security: Some(Security::None),
            ..Self::new()
        }
    }

    /// Sets the EHLO domain.
    #[must_use]
    pub fn with_local_domain(mut self, domain: impl Into<String>) -> Self {
        self.local_domain = domain.into();
        self
    }

    /// Sets the limit for a whole session.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn session(
        &self,
        config: &MailboxConfig,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError> {
        let host = config.smtp_server.as_str();
        let port = config.smtp_port;
        let security = self
            .security
            .unwrap_or_else(|| Security::for_port(config.smtp_port));
        debug!(host, port, security = security.display_name(), "opening SMTP session");

        let stream = connect(host, port).await.map_err(at(Stage::Connect))?;
        let stream = if security == Security::Tls {
            stream.upgrade_to_tls(host).await.map_err(at(Stage::Tls))?
        } else {
            stream
        };

        let client = Client::greet(stream)
            .await
            .map_err(at(Stage::Connect))?
            .ehlo(&self.local_domain)
            .await
            .map_err(at(Stage::Connect))?;

        let client = if security == Security::StartTls {
            client.starttls(host).await.map_err(at(Stage::Tls))?
        } else {
            client
        };

        let credentials = &config.credentials;
        let client = client
            .authenticate(&credentials.email, &credentials.password)
            .await
            .map_err(at(Stage::Auth))?;

        let client = client
            .send_mail(from, recipients, message)
            .await
            .map_err(at(Stage::Send))?;

        // The message is already accepted; a failed QUIT changes nothing.
        if let Err(err) = client.quit().await {
            debug!(error = %err, "QUIT failed after delivery");
        }
        Ok(())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(
        &self,
        config: &MailboxConfig,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError> {
        tokio::time::timeout(self.timeout, self.session(config, from, recipients, message))
            .await
            .map_err(|_| TransportError::new(TransportErrorKind::Connect, "session timed out"))?
    }
}

/// Sends composed mail on behalf of users.
#[derive(Clone)]
pub struct Mailer {
    configs: ConfigStore,
    stats: Stats,
    transport: Arc<dyn MailTransport>,
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer").finish_non_exhaustive()
    }
}

impl Mailer {
    /// Creates a mailer delivering through `transport`.
    #[must_use]
    pub fn new(configs: ConfigStore, stats: Stats, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            configs,
            stats,
            transport,
        }
    }

    /// Sends `email` from `user`'s mailbox.
    ///
    /// Configuration, addresses and attachment size are checked before any
    /// connection is made. `emails_sent` grows by one on success only.
    ///
    /// # Errors
    ///
    /// See [`SendError`].
    pub async fn send_email(&self, user: UserId, email: OutgoingEmail) -> Result<(), SendError> {
        let config = self
            .configs
            .get(user)
            .await?
            .filter(MailboxConfig::is_sendable)
            .ok_or(SendError::NotConfigured)?;

        let from = Address::new(config.credentials.email.as_str())
            .map_err(|_| SendError::InvalidAddress(config.credentials.email.clone()))?;
        let recipients = email
            .recipients()
            .map(|to| Address::new(to).map_err(|_| SendError::InvalidAddress(to.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(SendError::InvalidAddress(email.to));
        }

        let size = email.attachment_bytes();
        if size > MAX_ATTACHMENT_BYTES {
            return Err(SendError::AttachmentTooLarge {
                size,
                limit: MAX_ATTACHMENT_BYTES,
            });
        }

        let attachment_count = email.attachments.len();
        let mut builder = MessageBuilder::new()
            .from(from.as_str())
            .subject(email.subject)
            .text(email.body);
        for recipient in &recipients {
            builder = builder.to(recipient.as_str());
        }
        for attachment in email.attachments {
            builder = builder.attach(attachment);
        }
        let message = builder.build()?.to_bytes();

        if let Err(err) = self
            .transport
            .deliver(&config, &from, &recipients, &message)
            .await
        {
            warn!(%user, kind = ?err.kind, detail = %err.detail, "send failed");
            return Err(err.into());
        }

        self.stats.increment(Metric::EmailsSent).await;
        info!(
            %user,
            recipients = recipients.len(),
            attachments = attachment_count,
            bytes = message.len(),
            "email sent"
        );
        Ok(())
    }
}
