//! The message envelope and body, and SMTP dot stuffing.

/// Line terminator used on the wire.
pub const CRLF: &str = "\r\n";

/// A mail transaction: envelope sender, ordered recipients and body.
///
/// The body is opaque text, already dot-unstuffed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients in the order they were given. Duplicates are kept.
    pub recipients: Vec<String>,
    /// Message body.
    pub message: String,
}

impl Message {
    /// Creates a message without recipients.
    #[must_use]
    pub fn new(sender: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients: Vec::new(),
            message: message.into(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Returns a copy of this message addressed to `recipients` only.
    #[must_use]
    pub fn with_recipients(&self, recipients: Vec<String>) -> Self {
        Self {
            sender: self.sender.clone(),
            recipients,
            message: self.message.clone(),
        }
    }
}

/// Splits a body into CRLF-free lines and escapes lines starting with `.`.
///
/// Bare `\n` and `\r\n` are both accepted as line breaks.
#[must_use]
pub fn stuff_lines(body: &str) -> Vec<String> {
    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Undoes dot stuffing on a CRLF-joined body.
///
/// Only lines starting with `..` lose their first dot.
#[must_use]
pub fn unstuff(body: &str) -> String {
    body.split(CRLF)
        .map(|line| if line.starts_with("..") { &line[1..] } else { line })
        .collect::<Vec<_>>()
        .join(CRLF)
}
