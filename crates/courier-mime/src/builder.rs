//! Outgoing message construction.

use crate::content_type::ContentType;
use crate::encoding::{encode_base64_lines, encode_header_value, encode_quoted_printable};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;
use std::fmt::Write as _;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content_type: ContentType,
    data: Vec<u8>,
}

impl Attachment {
    /// Creates an `application/octet-stream` attachment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an empty name or one containing
    /// control characters.
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        if filename.trim().is_empty() || filename.chars().any(char::is_control) {
            return Err(Error::InvalidFilename(filename));
        }
        Ok(Self {
            filename,
            content_type: ContentType::octet_stream(),
            data,
        })
    }

    /// Overrides the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// File name as shown to the recipient.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Declared content type.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Raw file contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the raw contents in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-byte file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn disposition(&self) -> String {
        if crate::encoding::is_plain_header(&self.filename) {
            let escaped = self.filename.replace('\\', "\\\\").replace('"', "\\\"");
            format!("attachment; filename=\"{escaped}\"")
        } else {
            format!(
                "attachment; filename=\"{}\"",
                encode_header_value(&self.filename).replace("\r\n ", " ")
            )
        }
    }
}

/// A rendered message ready for SMTP `DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
    body: String,
}

impl Message {
    /// Returns the first header with the given name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers in output order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encoded body following the header block.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Serializes the message with CRLF line endings.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.body.len() + 512);
        for (name, value) in &self.headers {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out.into_bytes()
    }
}

/// Builder for plain-text messages with optional attachments.
///
/// ```
/// use courier_mime::{Attachment, MessageBuilder};
///
/// let message = MessageBuilder::new()
///     .from("alice@example.com")
///     .to("bob@example.com")
///     .subject("Report")
///     .text("See attached.")
///     .attach(Attachment::new("report.txt", b"numbers".to_vec()).unwrap())
///     .build()
///     .unwrap();
/// assert!(message.header("Content-Type").unwrap().starts_with("multipart/mixed"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: String,
    text: String,
    attachments: Vec<Attachment>,
    date: Option<DateTime<FixedOffset>>,
    message_id: Option<String>,
    boundary: Option<String>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender address.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Appends an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fixes the `Date` header instead of using the local clock.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Fixes the `Message-ID` header (without angle brackets).
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Fixes the multipart boundary.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Total raw size of all attachments.
    #[must_use]
    pub fn attachment_bytes(&self) -> usize {
        self.attachments.iter().map(Attachment::len).sum()
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHeader`] without a sender or recipient, and
    /// [`Error::InvalidHeader`] when an address or the subject contains a line
    /// break.
    pub fn build(self) -> Result<Message> {
        let from = self.from.ok_or(Error::MissingHeader("From"))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To"));
        }
        reject_line_breaks("From", &from)?;
        for to in &self.to {
            reject_line_breaks("To", to)?;
        }
        reject_line_breaks("Subject", &self.subject)?;

        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset())
            .to_rfc2822();
        let message_id = self
            .message_id
            .unwrap_or_else(|| generate_message_id(&from));

        let mut headers = vec![
            ("Date".to_string(), date),
            ("From".to_string(), from),
            ("To".to_string(), self.to.join(", ")),
            ("Subject".to_string(), encode_header_value(&self.subject)),
            ("Message-ID".to_string(), format!("<{message_id}>")),
            ("MIME-Version".to_string(), "1.0".to_string()),
        ];

        let text_type = ContentType::text_plain().to_string();
        let text_body = encode_quoted_printable(&self.text);

        let boundary = self.boundary.unwrap_or_else(generate_boundary);
        headers.push((
            "Content-Type".to_string(),
            ContentType::multipart_mixed(boundary.as_str()).to_string(),
        ));

        let mut body = String::from("This is a multi-part message in MIME format.\r\n");
        let _ = write!(
            body,
            "\r\n--{boundary}\r\nContent-Type: {text_type}\r\n\
             Content-Transfer-Encoding: quoted-printable\r\n\r\n{text_body}\r\n"
        );
        for attachment in &self.attachments {
            let _ = write!(
                body,
                "\r\n--{boundary}\r\nContent-Type: {}\r\n\
                 Content-Transfer-Encoding: base64\r\nContent-Disposition: {}\r\n\r\n{}",
                attachment.content_type,
                attachment.disposition(),
                encode_base64_lines(&attachment.data)
            );
        }
        let _ = write!(body, "\r\n--{boundary}--\r\n");

        Ok(Message { headers, body })
    }
}

fn reject_line_breaks(field: &'static str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        Err(Error::InvalidHeader(field))
    } else {
        Ok(())
    }
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).fold(String::with_capacity(bytes * 2), |mut acc, _| {
        let _ = write!(acc, "{:02x}", rng.r#gen::<u8>());
        acc
    })
}

fn generate_boundary() -> String {
    format!("courier-{}", random_hex(16))
}

fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches('>'))
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!(
        "{}.{}@{domain}",
        Local::now().timestamp_millis(),
        random_hex(8)
    )
}
