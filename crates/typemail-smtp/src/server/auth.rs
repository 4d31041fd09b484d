//! Credential verification for the AUTH command.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::state::ConnectionState;

/// Credentials collected by the AUTH exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password from PLAIN or LOGIN.
    Password {
        /// Authentication identity.
        username: String,
        /// Secret.
        password: String,
        /// Authorization identity; empty when not supplied.
        identity: String,
    },
    /// Arguments of the AUTH command after the mechanism name, when no
    /// username and password could be collected.
    Raw(Vec<String>),
}

/// Verifies credentials for a connection.
///
/// `State` is per-connection data owned by the verifier. It starts as
/// `State::default()` and is reachable through
/// [`ConnectionState::extra`].
pub trait Authenticator: Send + Sync + 'static {
    /// Per-connection verifier data.
    type State: Default + Send + Sync + 'static;

    /// Returns true if the credentials are accepted.
    fn verify(
        &self,
        state: &mut ConnectionState<Self::State>,
        mechanism: &str,
        credentials: Credentials,
    ) -> impl Future<Output = bool> + Send;
}

/// Rejects every attempt. Used when no authenticator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    type State = ();

    fn verify(
        &self,
        _state: &mut ConnectionState<()>,
        _mechanism: &str,
        _credentials: Credentials,
    ) -> impl Future<Output = bool> + Send {
        std::future::ready(false)
    }
}

pub(crate) fn encode(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    STANDARD.encode(input.as_bytes())
}

/// Decodes a base64 answer. Invalid input decodes to an empty string.
pub(crate) fn decode(input: &str) -> String {
    STANDARD
        .decode(input.trim())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Splits a decoded PLAIN payload into `(identity, username, password)`.
///
/// With three NUL-separated fields the first is the identity; missing
/// fields are empty.
pub(crate) fn split_plain(payload: &str) -> (String, String, String) {
    let mut fields: Vec<&str> = payload.split('\0').collect();
    let identity = if fields.len() == 3 {
        fields.remove(0)
    } else {
        ""
    };
    let username = fields.first().copied().unwrap_or_default();
    let password = fields.get(1).copied().unwrap_or_default();
    (
        identity.to_string(),
        username.to_string(),
        password.to_string(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        assert_eq!(encode("Username:"), "VXNlcm5hbWU6");
        assert_eq!(decode("VXNlcm5hbWU6"), "Username:");
        assert_eq!(encode(""), "");
    }

    #[test]
    fn invalid_base64_is_empty() {
        assert_eq!(decode("***"), "");
        assert_eq!(decode(""), "");
    }

    #[test]
    fn plain_without_identity() {
        let (identity, username, password) = split_plain("\0user\0pass");
        assert_eq!(identity, "");
        assert_eq!(username, "user");
        assert_eq!(password, "pass");
    }

    #[test]
    fn plain_with_identity() {
        let (identity, username, password) = split_plain("admin\0user\0pass");
        assert_eq!(identity, "admin");
        assert_eq!(username, "user");
        assert_eq!(password, "pass");
    }

    #[test]
    fn plain_two_fields() {
        let (identity, username, password) = split_plain("user\0pass");
        assert_eq!(identity, "");
        assert_eq!(username, "user");
        assert_eq!(password, "pass");
    }

    #[test]
    fn plain_garbage() {
        let (_, username, password) = split_plain("nonsense");
        assert_eq!(username, "nonsense");
        assert_eq!(password, "");
    }

    #[tokio::test]
    async fn no_auth_rejects() {
        let mut state = ConnectionState::<()>::new(100);
        let credentials = Credentials::Password {
            username: "user".into(),
            password: "pass".into(),
            identity: String::new(),
        };
        assert!(!NoAuth.verify(&mut state, "PLAIN", credentials).await);
    }
}
