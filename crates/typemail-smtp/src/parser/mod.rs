//! SMTP reply parser and command argument parser.

mod arguments;

pub use arguments::parse_arguments;

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One parsed line of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// Reply code from the first three characters.
    pub code: ReplyCode,
    /// True unless the line continues a multi-line reply.
    pub last: bool,
    /// Text after the separator.
    pub text: String,
}

/// Parses a single reply line.
///
/// The code is the three-digit prefix; the character at offset 3 decides
/// whether the reply continues (`-`) or ends (anything else).
///
/// # Errors
///
/// Returns an error if the line is shorter than four characters or has no
/// valid numeric code.
pub fn parse_reply_line(line: &str) -> Result<ReplyLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return Err(Error::Protocol(format!("Reply too short: {line:?}")));
    }

    let code = line
        .get(..3)
        .filter(|prefix| prefix.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|prefix| prefix.parse::<u16>().ok())
        .and_then(ReplyCode::checked)
        .ok_or_else(|| Error::Protocol(format!("Invalid reply code: {line:?}")))?;

    Ok(ReplyLine {
        code,
        last: bytes[3] != b'-',
        text: line.get(4..).unwrap_or_default().to_string(),
    })
}

/// Parses a complete reply from its wire lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns an error if the reply is empty, malformed, or ends early.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let mut accumulator = ReplyAccumulator::default();
    for line in lines {
        if let Some(reply) = accumulator.push(line)? {
            return Ok(reply);
        }
    }
    Err(Error::Protocol("Incomplete reply".into()))
}

/// Checks if a line is the last line of a multi-line reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() >= 4 && line.as_bytes()[3] != b'-'
}

/// Groups reply lines as they arrive.
///
/// The code of the first line is used for the whole group.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    code: Option<ReplyCode>,
    lines: Vec<String>,
}

impl ReplyAccumulator {
    /// Feeds one line; returns the reply once its last line arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is malformed. The accumulator is reset.
    pub fn push(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = match parse_reply_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.code = None;
                self.lines.clear();
                return Err(err);
            }
        };

        let code = *self.code.get_or_insert(parsed.code);
        self.lines.push(parsed.text);

        if parsed.last {
            self.code = None;
            return Ok(Some(Reply::new(code, std::mem::take(&mut self.lines))));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line_reply() {
        let lines = vec!["250 OK".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            "250-localhost, greeting accepted.".to_string(),
            "250-PIPELINING".to_string(),
            "250 SIZE 100000".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message,
            vec!["localhost, greeting accepted.", "PIPELINING", "SIZE 100000"]
        );
    }

    #[test]
    fn test_first_code_wins() {
        let lines = vec!["250-first".to_string(), "251 second".to_string()];
        assert_eq!(parse_reply(&lines).unwrap().code, ReplyCode::OK);
    }

    #[test]
    fn test_non_dash_separator_ends_reply() {
        let line = parse_reply_line("334 VXNlcm5hbWU6").unwrap();
        assert!(line.last);
        let line = parse_reply_line("220xready").unwrap();
        assert!(line.last);
        assert_eq!(line.text, "ready");
    }

    #[test]
    fn test_empty_text_after_separator() {
        let line = parse_reply_line("334 ").unwrap();
        assert_eq!(line.code, ReplyCode::AUTH_CONTINUE);
        assert_eq!(line.text, "");
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(!is_last_reply_line("250"));
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_parse_error_too_short() {
        assert!(parse_reply_line("250").is_err());
        assert!(parse_reply_line("").is_err());
    }

    #[test]
    fn test_parse_error_invalid_code() {
        assert!(parse_reply_line("ABC OK").is_err());
        assert!(parse_reply_line("2x0 OK").is_err());
        assert!(parse_reply_line("099 OK").is_err());
    }

    #[test]
    fn test_parse_error_unterminated() {
        let lines = vec!["250-first".to_string()];
        assert!(parse_reply(&lines).is_err());
    }

    #[test]
    fn test_accumulator_resets_after_error() {
        let mut acc = ReplyAccumulator::default();
        assert!(acc.push("250-first").unwrap().is_none());
        assert!(acc.push("bogus").is_err());
        let reply = acc.push("221 Bye").unwrap().unwrap();
        assert_eq!(reply.code, ReplyCode::CLOSING);
        assert_eq!(reply.message, vec!["Bye"]);
    }
}
