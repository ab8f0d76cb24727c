//! Validation of single setup inputs.

/// Why a setup input was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputValidationError {
    /// Server name is blank.
    EmptyHost,
    /// Server name has whitespace or characters outside `[A-Za-z0-9.-]`.
    InvalidHost,
    /// Server name is longer than 253 characters.
    HostTooLong,
    /// Port is not an integer.
    PortNotNumber,
    /// Port is outside 1-65535.
    PortOutOfRange,
    /// Email address format is invalid.
    InvalidEmail,
    /// Password is blank.
    EmptyPassword,
}

impl InputValidationError {
    /// Human-readable message, safe to show the user.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "Server name is required",
            Self::InvalidHost => "Server name may only contain letters, digits, dots and hyphens",
            Self::HostTooLong => "Server name is too long",
            Self::PortNotNumber => "Port must be a number",
            Self::PortOutOfRange => "Port must be 1-65535",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyPassword => "Password is required",
        }
    }

    /// The kind of field this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHost | Self::InvalidHost | Self::HostTooLong => "server",
            Self::PortNotNumber | Self::PortOutOfRange => "port",
            Self::InvalidEmail => "email",
            Self::EmptyPassword => "password",
        }
    }
}

impl std::fmt::Display for InputValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for InputValidationError {}

const MAX_HOST_LEN: usize = 253;

/// Validates a server hostname, returning it trimmed.
///
/// # Errors
///
/// Returns the reason the name was refused.
pub fn validate_host(input: &str) -> Result<String, InputValidationError> {
    let host = input.trim();
    if host.is_empty() {
        return Err(InputValidationError::EmptyHost);
    }
    if host.len() > MAX_HOST_LEN {
        return Err(InputValidationError::HostTooLong);
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(InputValidationError::InvalidHost);
    }
    Ok(host.to_string())
}

/// Parses a TCP port.
///
/// # Errors
///
/// Returns [`InputValidationError::PortNotNumber`] for non-integers and
/// [`InputValidationError::PortOutOfRange`] for 0 or values above 65535.
pub fn validate_port(input: &str) -> Result<u16, InputValidationError> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| InputValidationError::PortNotNumber)?;
    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(InputValidationError::PortOutOfRange)
}

/// Validates a mailbox address, returning it trimmed.
///
/// # Errors
///
/// Returns [`InputValidationError::InvalidEmail`] unless the address has
/// exactly one `@`, non-empty local and domain parts, and no whitespace.
pub fn validate_email(input: &str) -> Result<String, InputValidationError> {
    let email = input.trim();
    if is_valid_email(email) {
        Ok(email.to_string())
    } else {
        Err(InputValidationError::InvalidEmail)
    }
}

/// Accepts any non-empty password verbatim.
///
/// # Errors
///
/// Returns [`InputValidationError::EmptyPassword`] for blank input.
pub fn validate_password(input: &str) -> Result<String, InputValidationError> {
    if input.trim().is_empty() {
        Err(InputValidationError::EmptyPassword)
    } else {
        Ok(input.to_string())
    }
}

/// Basic email validation.
pub(crate) fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hosts() {
        assert_eq!(validate_host("  smtp.example.com "), Ok("smtp.example.com".into()));
        assert_eq!(validate_host("mail-1.example.co.uk"), Ok("mail-1.example.co.uk".into()));
        assert_eq!(validate_host("localhost"), Ok("localhost".into()));
    }

    #[test]
    fn test_invalid_hosts() {
        assert_eq!(validate_host("   "), Err(InputValidationError::EmptyHost));
        assert_eq!(validate_host("smtp example.com"), Err(InputValidationError::InvalidHost));
        assert_eq!(validate_host("smtp_example.com"), Err(InputValidationError::InvalidHost));
        assert_eq!(validate_host("smtp.exämple.com"), Err(InputValidationError::InvalidHost));
        assert_eq!(validate_host(&"a".repeat(254)), Err(InputValidationError::HostTooLong));
        assert!(validate_host(&"a".repeat(253)).is_ok());
    }

    #[test]
    fn test_ports() {
        assert_eq!(validate_port("587"), Ok(587));
        assert_eq!(validate_port(" 1 "), Ok(1));
        assert_eq!(validate_port("65535"), Ok(65535));
        assert_eq!(validate_port("abc"), Err(InputValidationError::PortNotNumber));
        assert_eq!(validate_port("58.7"), Err(InputValidationError::PortNotNumber));
        assert_eq!(validate_port(""), Err(InputValidationError::PortNotNumber));
        assert_eq!(validate_port("0"), Err(InputValidationError::PortOutOfRange));
        assert_eq!(validate_port("65536"), Err(InputValidationError::PortOutOfRange));
        assert_eq!(validate_port("-25"), Err(InputValidationError::PortOutOfRange));
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@sub.example.com"));
        assert!(is_valid_email("user@localhost"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email("us er@example.com"));
    }

    #[test]
    fn test_password() {
        assert_eq!(validate_password(" pass word "), Ok(" pass word ".into()));
        assert_eq!(validate_password(" \t"), Err(InputValidationError::EmptyPassword));
    }

    #[test]
    fn test_messages_and_fields() {
        assert_eq!(InputValidationError::PortNotNumber.to_string(), "Port must be a number");
        assert_eq!(InputValidationError::InvalidEmail.field(), "email");
    }
}
