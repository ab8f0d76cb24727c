//! Content types for generated parts.

use crate::error::{Error, Result};
use std::fmt;

/// A MIME content type with ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Top-level type, e.g. `text`.
    pub main_type: String,
    /// Subtype, e.g. `plain`.
    pub sub_type: String,
    /// Parameters in output order.
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a content type without parameters.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_ascii_lowercase(),
            sub_type: sub_type.into().to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// `text/plain; charset=utf-8`
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// `application/octet-stream`
    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `multipart/mixed` with the given boundary.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "mixed").with_parameter("boundary", boundary)
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into().to_ascii_lowercase();
        let value = value.into();
        if let Some(slot) = self.parameters.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.parameters.push((key, value));
        }
        self
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True for `multipart/*`.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Parses `type/subtype[; key=value]*`, as supplied by a chat platform
    /// for an uploaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if either half of the type is missing or contains
    /// characters outside RFC 2045 tokens.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (main, sub) = essence
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;
        let (main, sub) = (main.trim(), sub.trim());
        if !is_token(main) || !is_token(sub) {
            return Err(Error::InvalidContentType(s.to_string()));
        }

        let mut content_type = Self::new(main, sub);
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let key = key.trim();
                if is_token(key) {
                    content_type =
                        content_type.with_parameter(key, value.trim().trim_matches('"'));
                }
            }
        }
        Ok(content_type)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?=".contains(c))
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for (key, value) in &self.parameters {
            if is_token(value) {
                write!(f, "; {key}={value}")?;
            } else {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_plain_display() {
        assert_eq!(ContentType::text_plain().to_string(), "text/plain; charset=utf-8");
    }

    #[test]
    fn boundary_is_quoted_when_needed() {
        let ct = ContentType::multipart_mixed("==part 1==");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"==part 1==\"");
        assert!(ct.is_multipart());
        assert_eq!(ct.parameter("Boundary"), Some("==part 1=="));
    }

    #[test]
    fn parse_with_parameters() {
        let ct = ContentType::parse("Image/PNG; name=\"chart.png\"").unwrap();
        assert_eq!(ct.main_type, "image");
        assert_eq!(ct.sub_type, "png");
        assert_eq!(ct.parameter("name"), Some("chart.png"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ContentType::parse("").is_err());
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("text/").is_err());
        assert!(ContentType::parse("te xt/plain").is_err());
        assert!(ContentType::parse("text/plain\r\nBcc: x@example.com").is_err());
    }

    #[test]
    fn with_parameter_replaces() {
        let ct = ContentType::text_plain().with_parameter("CHARSET", "us-ascii");
        assert_eq!(ct.parameters.len(), 1);
        assert_eq!(ct.parameter("charset"), Some("us-ascii"));
    }
}
