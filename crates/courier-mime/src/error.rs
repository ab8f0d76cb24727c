//! Error types for message generation.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a message cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A header value contains CR or LF and would split the header block.
    #[error("header {0} contains a line break")]
    InvalidHeader(&'static str),

    /// A required header was never set.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Content type text is not `type/subtype`.
    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    /// Attachment filename is empty or contains control characters.
    #[error("invalid attachment filename: {0:?}")]
    InvalidFilename(String),
}
