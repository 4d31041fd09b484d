//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The peer answered a command with an unexpected reply code.
    #[error("SMTP error {code} after {command}: {message}")]
    SmtpError {
        /// The step that was rejected (e.g. `RCPT TO:<a@example.com>`).
        command: String,
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply text from the peer.
        message: String,
    },

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message too large.
    #[error("Message exceeds size limit: {0} bytes")]
    MessageTooLarge(usize),

    /// Feature not supported by the peer.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// The transport was closed by either side.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An inbound line exceeded the maximum line length.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// MX resolution failed.
    #[error("Failed to resolve {domain}: {reason}")]
    Resolve {
        /// Domain that was looked up.
        domain: String,
        /// Resolver error text.
        reason: String,
    },
}

impl Error {
    /// Creates an SMTP error from the rejected step and the peer's reply.
    #[must_use]
    pub fn smtp_error(command: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            command: command.into(),
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the error means the transport is gone.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reply_codes() {
        assert!(Error::smtp_error("DATA", 554, "rejected").is_permanent());
        assert!(Error::smtp_error("RCPT TO:<a@b>", 451, "later").is_transient());
        assert!(!Error::Protocol("bad".into()).is_permanent());
    }

    #[test]
    fn display_names_the_step() {
        let err = Error::smtp_error("MAIL FROM:<a@example.com>", 550, "denied");
        assert_eq!(
            err.to_string(),
            "SMTP error 550 after MAIL FROM:<a@example.com>: denied"
        );
    }

    #[test]
    fn disconnects() {
        assert!(Error::ConnectionClosed.is_disconnect());
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(!Error::MessageTooLarge(10).is_disconnect());
    }
}
