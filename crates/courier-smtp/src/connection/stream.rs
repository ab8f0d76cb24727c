//! Byte streams an SMTP session runs over.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

/// Any bidirectional byte stream usable as the transport under a session.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Longest reply line accepted before the server is considered broken.
const MAX_LINE: usize = 4096;

/// Session transport, either still in cleartext or TLS-protected.
pub enum SmtpStream {
    /// Cleartext.
    Plain(BufReader<Box<dyn Io>>),
    /// TLS, either implicit or after STARTTLS.
    Tls(Box<BufReader<TlsStream<Box<dyn Io>>>>),
}

impl std::fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("SmtpStream::Plain"),
            Self::Tls(_) => f.write_str("SmtpStream::Tls"),
        }
    }
}

impl SmtpStream {
    /// Wraps an already-connected cleartext stream.
    pub fn plain(io: impl Io + 'static) -> Self {
        let boxed: Box<dyn Io> = Box::new(io);
        Self::Plain(BufReader::new(boxed))
    }

    /// True once the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one CRLF-terminated line, without the line ending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] on EOF, or an I/O error.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Plain(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        if line.len() > MAX_LINE {
            return Err(Error::Protocol(format!(
                "reply line longer than {MAX_LINE} bytes"
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes and flushes `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Performs the TLS handshake on a cleartext stream.
    ///
    /// Any bytes the server sent after its `220` reply to STARTTLS are
    /// treated as an injection attempt and abort the upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, buffered
    /// cleartext is pending, or the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let reader = match self {
            Self::Plain(reader) => reader,
            Self::Tls(_) => return Err(Error::Protocol("stream is already encrypted".into())),
        };
        if !reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "server sent data before the TLS handshake".into(),
            ));
        }

        let tls = handshake(hostname, reader.into_inner()).await?;
        debug!(hostname, "TLS established");
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }
}

/// Opens a cleartext TCP connection (for submission with STARTTLS).
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp = TcpStream::connect((hostname, port)).await?;
    debug!(hostname, port, "connected");
    Ok(SmtpStream::plain(tcp))
}

async fn handshake(hostname: &str, io: Box<dyn Io>) -> Result<TlsStream<Box<dyn Io>>> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("invalid TLS server name: {hostname}")))?;
    Ok(tls_connector()?.connect(server_name, io).await?)
}

/// TLS connector trusting the webpki root set.
///
/// The provider is named explicitly: other crates in the same binary may
/// enable a second rustls backend, after which there is no process default.
fn tls_connector() -> Result<TlsConnector> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn reads_lines_without_crlf() {
        let mock = Builder::new().read(b"220 ready\r\n250 OK\r\n").build();
        let mut stream = SmtpStream::plain(mock);
        assert_eq!(stream.read_line().await.unwrap(), "220 ready");
        assert_eq!(stream.read_line().await.unwrap(), "250 OK");
    }

    #[tokio::test]
    async fn eof_is_connection_closed() {
        let mock = Builder::new().build();
        let mut stream = SmtpStream::plain(mock);
        assert!(matches!(
            stream.read_line().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn refuses_upgrade_with_pending_cleartext() {
        let mock = Builder::new()
            .read(b"220 go ahead\r\n250 injected\r\n")
            .build();
        let mut stream = SmtpStream::plain(mock);
        stream.read_line().await.unwrap();
        let err = stream.upgrade_to_tls("mail.example.com").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn connector_builds_without_process_default_provider() {
        assert!(tls_connector().is_ok());
    }
}
