//! Transfer encodings for generated messages.
//!
//! Base64 for attachments, quoted-printable for text bodies, and RFC 2047
//! encoded words for header values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length (RFC 2045 §6.7, §6.8).
pub const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes per RFC 2047 word: 45 bytes become 60 base64 characters, which
/// with the `=?utf-8?B?` / `?=` framing stays under 75.
const WORD_CHUNK: usize = 45;

/// Base64-encodes `data` as CRLF-separated lines of at most 76 characters.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        // base64 output is ASCII, so every chunk is valid UTF-8.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// Encodes text as quoted-printable with CRLF line endings.
///
/// Hard line breaks in the input (LF or CRLF) are preserved; long lines get
/// soft breaks so no output line exceeds 76 characters. Trailing spaces and
/// tabs are encoded so transports cannot strip them.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_qp_line(line.as_bytes(), &mut out);
        if lines.peek().is_some() {
            out.push_str("\r\n");
        }
    }
    out
}

fn encode_qp_line(line: &[u8], out: &mut String) {
    let mut column = 0;
    for (i, &byte) in line.iter().enumerate() {
        let last = i + 1 == line.len();
        let literal = matches!(byte, b'!'..=b'<' | b'>'..=b'~') || (matches!(byte, b' ' | b'\t') && !last);
        let width = if literal { 1 } else { 3 };

        // Leave room for the trailing '=' of a soft break.
        if column + width > MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            column = 0;
        }
        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        column += width;
    }
}

/// True if `value` can appear in a header unencoded.
#[must_use]
pub fn is_plain_header(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !value.contains("=?")
}

/// Encodes a header value as RFC 2047 `B` words when it is not plain ASCII.
///
/// Long values are split at character boundaries into several words joined
/// by folding whitespace, keeping each word within 75 characters.
#[must_use]
pub fn encode_header_value(value: &str) -> String {
    if is_plain_header(value) {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, ch) in value.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > WORD_CHUNK {
            words.push(encoded_word(&value[start..end]));
            start = end;
        }
        end = next;
    }
    if start < value.len() {
        words.push(encoded_word(&value[start..]));
    }
    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(chunk.as_bytes()))
}
