//! Standard replies sent by the server.

use super::{Reply, ReplyCode};

/// A canned reply: a code with fixed single-line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canned {
    /// Reply code.
    pub code: ReplyCode,
    /// Reply text.
    pub text: &'static str,
}

impl Canned {
    const fn new(code: u16, text: &'static str) -> Self {
        Self {
            code: ReplyCode::new(code),
            text,
        }
    }
}

impl From<Canned> for Reply {
    fn from(canned: Canned) -> Self {
        Self::single(canned.code, canned.text)
    }
}

/// `221 Bye`
pub const BYE: Canned = Canned::new(221, "Bye");
/// `250 Ok`
pub const OK: Canned = Canned::new(250, "Ok");
/// `220 TLS go ahead`
pub const TLS_GO_AHEAD: Canned = Canned::new(220, "TLS go ahead");
/// `235 Authentication successful`
pub const AUTHENTICATION_SUCCESSFUL: Canned = Canned::new(235, "Authentication successful");
/// `354 Start mail input`
pub const START_MAIL_INPUT: Canned = Canned::new(354, "Start mail input; end with <CRLF>.<CRLF>");
/// `421 The server is shutting down`
pub const SERVER_SHUTTING_DOWN: Canned = Canned::new(421, "The server is shutting down");
/// `501 Syntax error in parameters`
pub const SYNTAX_ERROR_ARGUMENT: Canned = Canned::new(501, "Syntax error in parameters");
/// `502 Not implemented`
pub const NOT_IMPLEMENTED: Canned = Canned::new(502, "Not implemented");
/// `503 Bad sequence of commands`
pub const BAD_SEQUENCE: Canned = Canned::new(503, "Bad sequence of commands");
/// `504 Not implemented`, for unsupported command parameters.
pub const NOT_IMPLEMENTED_ARGUMENT: Canned = Canned::new(504, "Not implemented");
/// `535 Bad username or password`
pub const BAD_USERNAME_OR_PASSWORD: Canned = Canned::new(535, "Bad username or password");
/// `552 Maximum message size exceeded`
pub const MAXIMUM_SIZE_EXCEEDED: Canned = Canned::new(552, "Maximum message size exceeded");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_reply() {
        let reply: Reply = BYE.into();
        assert_eq!(reply.to_lines(), vec!["221 Bye"]);
    }

    #[test]
    fn codes_match_named_constants() {
        assert_eq!(OK.code, ReplyCode::OK);
        assert_eq!(BAD_SEQUENCE.code, ReplyCode::BAD_SEQUENCE);
        assert_eq!(MAXIMUM_SIZE_EXCEEDED.code, ReplyCode::EXCEEDED_STORAGE);
        assert_eq!(START_MAIL_INPUT.code, ReplyCode::START_DATA);
        assert_eq!(BAD_USERNAME_OR_PASSWORD.code, ReplyCode::AUTH_FAILED);
    }
}
