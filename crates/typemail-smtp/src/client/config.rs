//! Client configuration types.

/// Client connection security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientSecurity {
    /// No encryption. **Not recommended for production.**
    None,
    /// Upgrade with STARTTLS when the server offers it.
    #[default]
    StartTlsAuto,
    /// Upgrade with STARTTLS, failing if the server does not offer it.
    StartTlsRequired,
    /// TLS from the start (port 465).
    Tls,
}

impl ClientSecurity {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTlsAuto | Self::StartTlsRequired => 25,
            Self::Tls => 465,
        }
    }
}

/// SMTP client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server hostname, also used for TLS server name verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: ClientSecurity,
    /// Skip certificate verification.
    pub accept_invalid_certs: bool,
    /// Hostname sent with EHLO/HELO.
    pub client_hostname: String,
}

impl ClientConfig {
    /// Creates a configuration with opportunistic STARTTLS on port 25.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ClientConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(host)
    }
}

/// Builder for client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    host: String,
    port: Option<u16>,
    security: ClientSecurity,
    accept_invalid_certs: bool,
    client_hostname: String,
}

impl ClientConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: ClientSecurity::default(),
            accept_invalid_certs: false,
            client_hostname: "localhost".to_string(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: ClientSecurity) -> Self {
        self.security = security;
        self
    }

    /// Skips certificate verification.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Sets the hostname sent with EHLO/HELO.
    #[must_use]
    pub fn client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = hostname.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            accept_invalid_certs: self.accept_invalid_certs,
            client_hostname: self.client_hostname,
        }
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
    fn test_default_ports() {
        assert_eq!(ClientSecurity::None.default_port(), 25);
        assert_eq!(ClientSecurity::StartTlsAuto.default_port(), 25);
        assert_eq!(ClientSecurity::StartTlsRequired.default_port(), 25);
        assert_eq!(ClientSecurity::Tls.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = ClientConfig::new("mx.example.com");
        assert_eq!(config.host, "mx.example.com");
        assert_eq!(config.port, 25);
        assert_eq!(config.security, ClientSecurity::StartTlsAuto);
        assert_eq!(config.client_hostname, "localhost");
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder("smtp.example.com")
            .security(ClientSecurity::Tls)
            .client_hostname("client.example.com")
            .accept_invalid_certs(true)
            .build();

        assert_eq!(config.port, 465);
        assert_eq!(config.client_hostname, "client.example.com");
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_config_builder_explicit_port() {
        let config = ClientConfig::builder("localhost")
            .port(2525)
            .security(ClientSecurity::None)
            .build();
        assert_eq!(config.port, 2525);
    }
}
