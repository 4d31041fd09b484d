//! Server configuration types.

use std::fmt;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;

use super::auth::{Authenticator, NoAuth};
use crate::error::{Error, Result};

/// Largest accepted message body in bytes, unless configured otherwise.
pub const DEFAULT_MAX_SIZE: usize = 10_000_000;

/// Transport security offered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecureMode {
    /// Plaintext only. STARTTLS is refused.
    #[default]
    None,
    /// TLS from the first byte (port 465).
    Tls,
    /// Plaintext with an opportunistic STARTTLS upgrade.
    StartTls,
}

/// Server configuration shared by every connection.
pub struct ServerConfig<A = NoAuth> {
    /// Hostname used in the greeting and HELO/EHLO replies.
    pub hostname: String,
    /// Product name appended to the greeting banner.
    pub product: String,
    /// Largest accepted message body in bytes.
    pub max_size: usize,
    /// Transport security mode.
    pub secure_mode: SecureMode,
    /// TLS acceptor, required for [`SecureMode::Tls`] and [`SecureMode::StartTls`].
    pub tls: Option<TlsAcceptor>,
    /// Advertised AUTH mechanisms, uppercased.
    pub auth_methods: Vec<String>,
    /// Credential verifier.
    pub authenticator: Option<Arc<A>>,
}

impl<A> ServerConfig<A> {
    /// Returns the AUTH mechanisms actually offered.
    ///
    /// Empty unless an authenticator is configured.
    #[must_use]
    pub fn offered_auth_methods(&self) -> &[String] {
        if self.authenticator.is_some() {
            &self.auth_methods
        } else {
            &[]
        }
    }
}

impl ServerConfig<NoAuth> {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder<NoAuth> {
        ServerConfigBuilder::new()
    }
}

impl Default for ServerConfig<NoAuth> {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            product: "@typemail/smtp".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            secure_mode: SecureMode::None,
            tls: None,
            auth_methods: Vec::new(),
            authenticator: None,
        }
    }
}

impl<A> fmt::Debug for ServerConfig<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("hostname", &self.hostname)
            .field("product", &self.product)
            .field("max_size", &self.max_size)
            .field("secure_mode", &self.secure_mode)
            .field("tls", &self.tls.is_some())
            .field("auth_methods", &self.auth_methods)
            .field("authenticator", &self.authenticator.is_some())
            .finish()
    }
}

/// Builder for server configuration.
pub struct ServerConfigBuilder<A = NoAuth> {
    hostname: String,
    product: String,
    max_size: usize,
    secure_mode: SecureMode,
    tls: Option<TlsAcceptor>,
    auth_methods: Vec<String>,
    authenticator: Option<Arc<A>>,
}

impl ServerConfigBuilder<NoAuth> {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hostname: "localhost".to_string(),
            product: "@typemail/smtp".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            secure_mode: SecureMode::None,
            tls: None,
            auth_methods: Vec::new(),
            authenticator: None,
        }
    }
}

impl Default for ServerConfigBuilder<NoAuth> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator> ServerConfigBuilder<A> {
    /// Sets the server hostname.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the product name shown in the greeting.
    #[must_use]
    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn secure_mode(mut self, mode: SecureMode) -> Self {
        self.secure_mode = mode;
        self
    }

    /// Sets the TLS acceptor.
    #[must_use]
    pub fn tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Sets the advertised AUTH mechanisms.
    #[must_use]
    pub fn auth_methods<I, M>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.auth_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credential verifier.
    #[must_use]
    pub fn authenticator<B: Authenticator>(self, authenticator: B) -> ServerConfigBuilder<B> {
        ServerConfigBuilder {
            hostname: self.hostname,
            product: self.product,
            max_size: self.max_size,
            secure_mode: self.secure_mode,
            tls: self.tls,
            auth_methods: self.auth_methods,
            authenticator: Some(Arc::new(authenticator)),
        }
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a TLS mode is selected without an acceptor.
    pub fn build(self) -> Result<ServerConfig<A>> {
        if self.secure_mode != SecureMode::None && self.tls.is_none() {
            return Err(Error::Config(format!(
                "{:?} mode requires a TLS acceptor",
                self.secure_mode
            )));
        }

        let auth_methods = if self.authenticator.is_some() {
            self.auth_methods
                .iter()
                .map(|method| method.to_ascii_uppercase())
                .collect()
        } else {
            Vec::new()
        };

        Ok(ServerConfig {
            hostname: self.hostname,
            product: self.product,
            max_size: self.max_size,
            secure_mode: self.secure_mode,
            tls: self.tls,
            auth_methods,
            authenticator: self.authenticator,
        })
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
    use crate::server::auth::Credentials;
    use crate::server::state::ConnectionState;

    struct AllowAll;

    impl Authenticator for AllowAll {
        type State = ();

        fn verify(
            &self,
            _state: &mut ConnectionState<()>,
            _mechanism: &str,
            _credentials: Credentials,
        ) -> impl Future<Output = bool> + Send {
            std::future::ready(true)
        }
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::builder().build().unwrap();
        assert_eq!(config.hostname, "localhost");
        assert_eq!(config.product, "@typemail/smtp");
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.secure_mode, SecureMode::None);
        assert!(config.offered_auth_methods().is_empty());
    }

    #[test]
    fn test_tls_modes_require_acceptor() {
        for mode in [SecureMode::Tls, SecureMode::StartTls] {
            let result = ServerConfig::builder().secure_mode(mode).build();
            assert!(matches!(result, Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_auth_methods_need_authenticator() {
        let config = ServerConfig::builder()
            .auth_methods(["PLAIN"])
            .build()
            .unwrap();
        assert!(config.offered_auth_methods().is_empty());
    }

    #[test]
    fn test_auth_methods_uppercased() {
        let config = ServerConfig::builder()
            .hostname("mx.example.com")
            .auth_methods(["plain", "Login"])
            .authenticator(AllowAll)
            .max_size(1000)
            .build()
            .unwrap();
        assert_eq!(config.offered_auth_methods(), ["PLAIN", "LOGIN"]);
        assert_eq!(config.hostname, "mx.example.com");
        assert_eq!(config.max_size, 1000);
    }
}
