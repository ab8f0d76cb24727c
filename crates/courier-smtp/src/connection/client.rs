//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::parse_line;
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashSet;
use std::marker::PhantomData;
use tracing::debug;

/// Greeting received; not yet authenticated.
#[derive(Debug)]
pub struct Connected;

/// Credentials accepted; ready for a mail transaction.
#[derive(Debug)]
pub struct Authenticated;

/// `MAIL FROM` accepted.
#[derive(Debug)]
pub struct MailTransaction;

/// At least one `RCPT TO` accepted.
#[derive(Debug)]
pub struct RecipientAdded;

/// `DATA` accepted; the server is waiting for the message.
#[derive(Debug)]
pub struct Data;

/// SMTP client whose type parameter tracks the session state.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    local_domain: String,
    _state: PhantomData<State>,
}

impl<S> Client<S> {
    fn into_state<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            local_domain: self.local_domain,
            _state: PhantomData,
        }
    }

    /// Server greeting and EHLO capabilities.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// True once the session runs over TLS.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.stream.is_tls()
    }

    async fn command(&mut self, cmd: Command) -> Result<Reply> {
        debug!(verb = cmd.verb(), "smtp command");
        self.stream.write_all(&cmd.to_bytes()).await?;
        read_reply(&mut self.stream).await
    }

    /// Sends a command and requires a reply with `expected` code (or any 2xx
    /// when `expected` is `None`).
    async fn expect(&mut self, cmd: Command, expected: Option<ReplyCode>) -> Result<Reply> {
        let reply = self.command(cmd).await?;
        let ok = expected.map_or_else(|| reply.is_success(), |code| reply.code == code);
        if ok {
            Ok(reply)
        } else {
            Err(Error::rejected(reply.code.as_u16(), reply.text()))
        }
    }

    /// Ends the session with `QUIT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.command(Command::Quit).await?;
        if reply.is_success() || reply.code == ReplyCode::CLOSING {
            Ok(())
        } else {
            Err(Error::rejected(reply.code.as_u16(), reply.text()))
        }
    }
}

impl Client<Connected> {
    /// Reads the server greeting from a freshly opened stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is not a `220`.
    pub async fn greet(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::rejected(greeting.code.as_u16(), greeting.text()));
        }

        let hostname = greeting
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        debug!(server = %hostname, "greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            local_domain: String::new(),
            _state: PhantomData,
        })
    }

    /// Introduces the client and records the server's extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects EHLO.
    pub async fn ehlo(mut self, domain: &str) -> Result<Self> {
        self.local_domain = domain.to_string();
        self.refresh_extensions().await?;
        Ok(self)
    }

    async fn refresh_extensions(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            domain: self.local_domain.clone(),
        };
        let reply = self.expect(cmd, None).await?;
        // The first line echoes the server name; capabilities follow.
        self.server_info.extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(())
    }

    /// Upgrades the session to TLS and repeats EHLO, as RFC 3207 requires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if STARTTLS was not advertised, or an
    /// error if the upgrade fails.
    pub async fn starttls(mut self, hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        self.expect(Command::StartTls, Some(ReplyCode::SERVICE_READY))
            .await?;

        self.stream = self.stream.upgrade_to_tls(hostname).await?;
        // Pre-TLS capabilities must be discarded.
        self.server_info.extensions.clear();
        self.refresh_extensions().await?;
        Ok(self)
    }

    /// Authenticates with the best supported mechanism: PLAIN when offered
    /// (or when the server lists no mechanisms), LOGIN otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable mechanism is offered or the server
    /// rejects the credentials.
    pub async fn authenticate(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let offered = self.server_info.auth_mechanisms();
        if offered.contains(&AuthMechanism::Plain) || !self.server_info.advertises_auth() {
            self.auth_plain(username, password).await
        } else if offered.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH PLAIN or LOGIN".into()))
        }
    }

    /// Authenticates with SASL PLAIN, using an initial response.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        let reply = self
            .command(Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(token.clone()),
            })
            .await?;

        // Servers without SASL-IR answer with an empty challenge first.
        let reply = if reply.code == ReplyCode::AUTH_CONTINUE {
            self.command(Command::AuthResponse(token)).await?
        } else {
            reply
        };

        if reply.code != ReplyCode::AUTH_OK {
            return Err(Error::rejected(reply.code.as_u16(), reply.text()));
        }
        debug!("authenticated with PLAIN");
        Ok(self.into_state())
    }

    /// Authenticates with the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.expect(cmd, Some(ReplyCode::AUTH_CONTINUE)).await?;
        self.expect(
            Command::AuthResponse(STANDARD.encode(username)),
            Some(ReplyCode::AUTH_CONTINUE),
        )
        .await?;
        self.expect(
            Command::AuthResponse(STANDARD.encode(password)),
            Some(ReplyCode::AUTH_OK),
        )
        .await?;
        debug!("authenticated with LOGIN");
        Ok(self.into_state())
    }
}

impl Client<Authenticated> {
    /// Opens a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the sender.
    pub async fn mail_from(
        mut self,
        from: &Address,
        size: Option<usize>,
    ) -> Result<Client<MailTransaction>> {
        let size = size.filter(|_| self.server_info.supports_size());
        self.expect(
            Command::MailFrom {
                from: from.clone(),
                size,
            },
            None,
        )
        .await?;
        Ok(self.into_state())
    }

    /// Runs a whole transaction: sender, every recipient, and the message.
    ///
    /// The message is either accepted as a whole or the call fails; a
    /// recipient rejection aborts before any data is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] before contacting the server if the
    /// message exceeds the advertised SIZE, or the first server rejection.
    pub async fn send_mail(
        self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<Self> {
        let Some((first, rest)) = recipients.split_first() else {
            return Err(Error::InvalidAddress("no recipients".into()));
        };
        if let Some(limit) = self.server_info.max_message_size()
            && message.len() > limit
        {
            return Err(Error::MessageTooLarge {
                size: message.len(),
                limit,
            });
        }

        let client = self.mail_from(from, Some(message.len())).await?;
        let mut client = client.rcpt_to(first).await?;
        for recipient in rest {
            client = client.rcpt_to(recipient).await?;
        }
        client.data().await?.send_message(message).await
    }
}

impl Client<MailTransaction> {
    /// Adds the first recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the recipient.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Client<RecipientAdded>> {
        self.expect(Command::RcptTo { to: to.clone() }, None).await?;
        Ok(self.into_state())
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if RSET fails.
    pub async fn reset(mut self) -> Result<Client<Authenticated>> {
        self.expect(Command::Rset, None).await?;
        Ok(self.into_state())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the recipient.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Self> {
        self.expect(Command::RcptTo { to: to.clone() }, None).await?;
        Ok(self)
    }

    /// Asks to start message transfer.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers `354`.
    pub async fn data(mut self) -> Result<Client<Data>> {
        self.expect(Command::Data, Some(ReplyCode::START_DATA))
            .await?;
        Ok(self.into_state())
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if RSET fails.
    pub async fn reset(mut self) -> Result<Client<Authenticated>> {
        self.expect(Command::Rset, None).await?;
        Ok(self.into_state())
    }
}

impl Client<Data> {
    /// Transmits an RFC 5322 message and ends it with `.`.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed. The whole payload goes out in one write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the server rejects the message.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Authenticated>> {
        let payload = dot_stuff(message);
        self.stream.write_all(&payload).await?;

        let reply = read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::rejected(reply.code.as_u16(), reply.text()));
        }
        debug!(bytes = message.len(), "message accepted");
        Ok(self.into_state())
    }
}

/// Reads lines until the final line of a reply.
async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut code = None;
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        let (line_code, more, text) = parse_line(&line)?;
        if *code.get_or_insert(line_code) != line_code {
            return Err(Error::Protocol(format!(
                "reply code changed mid-reply: {line:?}"
            )));
        }
        lines.push(text.to_string());
        if !more {
            break;
        }
    }
    let code = code.ok_or_else(|| Error::Protocol("empty reply".into()))?;
    debug!(%code, "smtp reply");
    Ok(Reply::new(code, lines))
}

/// Normalizes line endings, escapes leading dots, and appends the
/// terminating `.` line.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
