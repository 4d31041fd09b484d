//! Per-connection server state.

/// State of one server connection.
///
/// `T` is the authenticator's own per-connection data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState<T = ()> {
    /// HELO or EHLO was accepted since the last TLS upgrade.
    pub greeted: bool,
    /// Envelope sender of the open transaction.
    pub sender: Option<String>,
    /// Envelope recipients of the open transaction, in order.
    pub recipients: Vec<String>,
    /// Largest accepted message body in bytes.
    pub max_size: usize,
    /// Verdict of the last AUTH exchange.
    pub authenticated: bool,
    /// The transport is TLS-encrypted.
    pub secure: bool,
    /// The transport has not been closed yet.
    pub open: bool,
    /// Authenticator data.
    pub extra: T,
}

impl<T: Default> ConnectionState<T> {
    /// Creates the state of a freshly accepted connection.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            greeted: false,
            sender: None,
            recipients: Vec::new(),
            max_size,
            authenticated: false,
            secure: false,
            open: true,
            extra: T::default(),
        }
    }
}

impl<T> ConnectionState<T> {
    /// Clears the sender and recipients.
    pub fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_session_flags() {
        let mut state = ConnectionState::<()>::new(10);
        state.greeted = true;
        state.authenticated = true;
        state.sender = Some("a@localhost".into());
        state.recipients.push("b@localhost".into());

        state.reset_transaction();

        assert!(state.sender.is_none());
        assert!(state.recipients.is_empty());
        assert!(state.greeted);
        assert!(state.authenticated);
        assert!(state.open);
    }
}
