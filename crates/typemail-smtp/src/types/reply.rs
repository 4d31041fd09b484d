//! SMTP reply types.

/// SMTP reply: a code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Creates a single-line reply.
    #[must_use]
    pub fn single(code: ReplyCode, text: impl Into<String>) -> Self {
        Self::new(code, vec![text.into()])
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.is_transient()
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.is_permanent()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Renders the reply as wire lines, without line terminators.
    ///
    /// All lines but the last use `CODE-text`, the last uses `CODE text`.
    /// A reply without text renders as the bare code.
    #[must_use]
    pub fn to_lines(&self) -> Vec<String> {
        let Some((last, init)) = self.message.split_last() else {
            return vec![self.code.to_string()];
        };

        let mut lines: Vec<String> = init
            .iter()
            .map(|line| format!("{}-{line}", self.code))
            .collect();
        lines.push(format!("{} {last}", self.code));
        lines
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Creates a reply code, rejecting values outside `100..=599`.
    #[must_use]
    pub const fn checked(code: u16) -> Option<Self> {
        if code >= 100 && code <= 599 {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Returns true if a server sending this code must close the connection
    /// right after writing it.
    #[must_use]
    pub const fn closes_connection(self) -> bool {
        self.0 >= 500
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Common reply codes
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 451 Local error in processing
    pub const LOCAL_ERROR: Self = Self(451);
    /// 500 Syntax error, command unrecognized
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501 Syntax error in parameters or arguments
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 502 Command not implemented
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 503 Bad sequence of commands
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 504 Command parameter not implemented
    pub const PARAMETER_NOT_IMPLEMENTED: Self = Self(504);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 552 Exceeded storage allocation
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// 554 Transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    mod reply_code_tests {
        use super::*;

        #[test]
        fn classes() {
            assert!(ReplyCode::OK.is_success());
            assert!(ReplyCode::START_DATA.is_intermediate());
            assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
            assert!(ReplyCode::BAD_SEQUENCE.is_permanent());
        }

        #[test]
        fn closing_codes() {
            assert!(ReplyCode::EXCEEDED_STORAGE.closes_connection());
            assert!(ReplyCode::AUTH_FAILED.closes_connection());
            assert!(!ReplyCode::SERVICE_UNAVAILABLE.closes_connection());
            assert!(!ReplyCode::CLOSING.closes_connection());
        }

        #[test]
        fn checked_range() {
            assert_eq!(ReplyCode::checked(250), Some(ReplyCode::OK));
            assert_eq!(ReplyCode::checked(99), None);
            assert_eq!(ReplyCode::checked(600), None);
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ReplyCode::OK), "250");
            assert_eq!(format!("{}", ReplyCode::AUTH_FAILED), "535");
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn renders_single_line() {
            let reply = Reply::single(ReplyCode::OK, "Ok");
            assert_eq!(reply.to_lines(), vec!["250 Ok"]);
        }

        #[test]
        fn renders_multi_line() {
            let reply = Reply::new(
                ReplyCode::OK,
                vec![
                    "localhost, greeting accepted.".to_string(),
                    "PIPELINING".to_string(),
                    "SIZE 1000".to_string(),
                ],
            );
            assert_eq!(
                reply.to_lines(),
                vec![
                    "250-localhost, greeting accepted.",
                    "250-PIPELINING",
                    "250 SIZE 1000"
                ]
            );
        }

        #[test]
        fn renders_bare_code() {
            let reply = Reply::new(ReplyCode::AUTH_CONTINUE, vec![]);
            assert_eq!(reply.to_lines(), vec!["334"]);
        }

        #[test]
        fn renders_empty_text_with_separator() {
            let reply = Reply::single(ReplyCode::AUTH_CONTINUE, "");
            assert_eq!(reply.to_lines(), vec!["334 "]);
        }

        #[test]
        fn message_text_multiple_lines() {
            let reply = Reply::new(
                ReplyCode::SERVICE_READY,
                vec!["smtp.example.com ESMTP".to_string(), "Ready".to_string()],
            );
            assert_eq!(reply.message_text(), "smtp.example.com ESMTP\nReady");
        }
    }
}
