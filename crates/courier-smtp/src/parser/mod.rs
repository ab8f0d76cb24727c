//! Reply parsing.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Splits one reply line into its code, continuation flag, and text.
///
/// `250-PIPELINING` is a continuation, `250 OK` (or a bare `250`) ends the
/// reply.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line does not start with a
/// three-digit code followed by `-`, a space, or nothing.
pub fn parse_line(line: &str) -> Result<(ReplyCode, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("malformed reply line: {line:?}")));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("malformed reply code: {line:?}")))?;

    match bytes.get(3).copied() {
        None => Ok((ReplyCode::new(code), false, "")),
        Some(b' ') => Ok((ReplyCode::new(code), false, &line[4..])),
        Some(b'-') => Ok((ReplyCode::new(code), true, &line[4..])),
        Some(_) => Err(Error::Protocol(format!("malformed reply line: {line:?}"))),
    }
}

/// Assembles a reply from its lines.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if there are no lines, a line is malformed,
/// or the lines disagree on the code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };
    let (code, _, _) = parse_line(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        let (line_code, _, rest) = parse_line(line)?;
        if line_code != code {
            return Err(Error::Protocol(format!(
                "reply code changed from {code} to {line_code} mid-reply"
            )));
        }
        text.push(rest.to_string());
    }

    Ok(Reply::new(code, text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn single_line() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn multi_line_ehlo() {
        let reply = parse_reply(&lines(&[
            "250-mail.example.com",
            "250-STARTTLS",
            "250 AUTH PLAIN LOGIN",
        ]))
        .unwrap();
        assert_eq!(
            reply.lines,
            vec!["mail.example.com", "STARTTLS", "AUTH PLAIN LOGIN"]
        );
    }

    #[test]
    fn bare_code_ends_reply() {
        let (code, more, text) = parse_line("354").unwrap();
        assert_eq!(code, ReplyCode::START_DATA);
        assert!(!more);
        assert_eq!(text, "");
    }

    #[test]
    fn continuation_flag() {
        assert!(parse_line("250-SIZE 100").unwrap().1);
        assert!(!parse_line("250 SIZE 100").unwrap().1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_line("25").is_err());
        assert!(parse_line("ABC OK").is_err());
        assert!(parse_line("250+OK").is_err());
    }

    #[test]
    fn rejects_mixed_codes() {
        assert!(parse_reply(&lines(&["250-one", "251 two"])).is_err());
    }
}
