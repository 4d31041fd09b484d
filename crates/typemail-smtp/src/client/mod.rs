//! SMTP client.
//!
//! A [`Client`] is ready once the greeting, EHLO (or HELO) and any STARTTLS
//! upgrade have completed. Each transaction is then a single
//! [`Client::send`] call.

mod config;

pub use config::{ClientConfig, ClientConfigBuilder, ClientSecurity};

use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyAccumulator;
use crate::transport::{self, Transport, tls};
use crate::types::{AuthMechanism, Extension, Message, Reply, ReplyCode, stuff_lines};

/// Message size limit assumed until the server advertises one.
pub const DEFAULT_MAX_SIZE: usize = 1_000_000;

/// What the client learned about the server during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server hostname from the greeting.
    pub hostname: String,
    /// EHLO lines other than `SIZE`, verbatim.
    pub capabilities: HashSet<String>,
    /// Largest message the server accepts.
    pub max_size: usize,
    /// The handshake has completed.
    pub welcomed: bool,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            capabilities: HashSet::new(),
            max_size: DEFAULT_MAX_SIZE,
            welcomed: false,
        }
    }
}

impl ServerInfo {
    /// Checks if an extension keyword was advertised, ignoring case.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.capabilities.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(keyword))
        })
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// Returns the advertised capabilities as extensions.
    #[must_use]
    pub fn extensions(&self) -> Vec<Extension> {
        self.capabilities
            .iter()
            .map(|line| Extension::parse(line))
            .chain(std::iter::once(Extension::Size(Some(self.max_size))))
            .collect()
    }

    fn apply_ehlo(&mut self, reply: &Reply) {
        self.capabilities.clear();
        self.max_size = DEFAULT_MAX_SIZE;

        for line in &reply.message {
            match line.strip_prefix("SIZE ").map(|size| size.trim().parse::<usize>()) {
                Some(Ok(0)) => self.max_size = usize::MAX,
                Some(Ok(size)) => self.max_size = size,
                _ => {
                    self.capabilities.insert(line.clone());
                }
            }
        }
    }
}

/// SMTP client over a plaintext or TLS stream.
pub struct Client<S = TcpStream> {
    transport: Transport<S>,
    config: ClientConfig,
    info: ServerInfo,
    connector: Option<TlsConnector>,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Client<TcpStream> {
    /// Connects to the configured server and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, greeting, EHLO/HELO or a required
    /// STARTTLS fails.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        if config.security == ClientSecurity::Tls {
            let connector = tls::connector(config.accept_invalid_certs)?;
            let transport = transport::connect_tls(&config.host, config.port, &connector).await?;
            return Self::handshake(transport, config, Some(connector)).await;
        }

        let transport = transport::connect(&config.host, config.port).await?;
        Self::handshake(transport, config, None).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<S> {
    /// Completes the handshake on an already connected plaintext stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting, EHLO/HELO or a required STARTTLS
    /// fails.
    pub async fn from_stream(stream: S, config: ClientConfig) -> Result<Self> {
        Self::handshake(Transport::new(stream), config, None).await
    }

    async fn handshake(
        transport: Transport<S>,
        config: ClientConfig,
        connector: Option<TlsConnector>,
    ) -> Result<Self> {
        let mut client = Self {
            transport,
            config,
            info: ServerInfo::default(),
            connector,
        };

        client.greet().await?;
        client.hello().await?;

        let wants_tls = matches!(
            client.config.security,
            ClientSecurity::StartTlsAuto | ClientSecurity::StartTlsRequired
        );
        if wants_tls && !client.transport.is_secure() {
            if client.info.supports_starttls() {
                client.starttls().await?;
            } else if client.config.security == ClientSecurity::StartTlsRequired {
                return Err(Error::NotSupported("STARTTLS".into()));
            }
        }

        client.info.welcomed = true;
        debug!(
            server = %client.info.hostname,
            secure = client.transport.is_secure(),
            max_size = client.info.max_size,
            "client ready"
        );
        Ok(client)
    }

    async fn greet(&mut self) -> Result<()> {
        let greeting = self.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::Protocol(format!(
                "Unexpected greeting: {} {}",
                greeting.code,
                greeting.message_text()
            )));
        }

        self.info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        Ok(())
    }

    /// Sends EHLO, falling back to HELO unless the transport failed.
    async fn hello(&mut self) -> Result<()> {
        let hostname = self.config.client_hostname.clone();
        let fallback = match self.command(&Command::Ehlo { hostname }).await {
            Ok(reply) if reply.code == ReplyCode::OK => {
                self.info.apply_ehlo(&reply);
                return Ok(());
            }
            Ok(reply) => format!("{} {}", reply.code, reply.message_text()),
            Err(
                err @ (Error::Io(_)
                | Error::Tls(_)
                | Error::ConnectionClosed
                | Error::LineTooLong(_)),
            ) => return Err(err),
            Err(err) => err.to_string(),
        };

        debug!(reason = %fallback, "EHLO failed, falling back to HELO");
        let hostname = self.config.client_hostname.clone();
        self.expect(&Command::Helo { hostname }, ReplyCode::OK)
            .await?;
        self.info.capabilities.clear();
        self.info.max_size = DEFAULT_MAX_SIZE;
        Ok(())
    }

    async fn starttls(&mut self) -> Result<()> {
        self.expect(&Command::StartTls, ReplyCode::SERVICE_READY)
            .await?;

        let connector = match &self.connector {
            Some(connector) => connector.clone(),
            None => {
                let connector = tls::connector(self.config.accept_invalid_certs)?;
                self.connector = Some(connector.clone());
                connector
            }
        };

        let host = self.config.host.clone();
        self.transport.upgrade_client(&connector, &host).await?;
        debug!("TLS established");

        self.hello().await
    }

    /// Returns true once the handshake has completed.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.info.welcomed
    }

    /// Returns true if the connection is TLS-encrypted.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Returns what the client learned about the server.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    /// Sends one message: MAIL, RCPT per recipient, DATA and the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before the handshake completed,
    /// [`Error::MessageTooLarge`] without contacting the server if the body
    /// exceeds the advertised size, and [`Error::SmtpError`] naming the step
    /// the server rejected.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        if !self.info.welcomed {
            return Err(Error::InvalidState("client is not ready".into()));
        }
        if message.message.len() > self.info.max_size {
            return Err(Error::MessageTooLarge(self.info.max_size));
        }

        self.expect(
            &Command::MailFrom {
                from: message.sender.clone(),
            },
            ReplyCode::OK,
        )
        .await?;

        for recipient in &message.recipients {
            self.expect(
                &Command::RcptTo {
                    to: recipient.clone(),
                },
                ReplyCode::OK,
            )
            .await?;
        }

        self.expect(&Command::Data, ReplyCode::START_DATA).await?;

        for line in stuff_lines(&message.message) {
            self.transport.write_line(&line).await?;
        }
        self.transport.write_line(".").await?;

        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::OK {
            return Err(Error::smtp_error(
                "DATA body",
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }

        info!(
            sender = %message.sender,
            recipients = message.recipients.len(),
            size = message.message.len(),
            "message sent"
        );
        Ok(())
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let credentials = format!("\0{username}\0{password}");
        let encoded = STANDARD.encode(credentials.as_bytes());

        self.expect(
            &Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(encoded),
            },
            ReplyCode::AUTH_SUCCESS,
        )
        .await?;
        debug!(mechanism = "PLAIN", "authenticated");
        Ok(())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.expect(&command, ReplyCode::AUTH_CONTINUE).await?;

        self.transport
            .write_line(&STANDARD.encode(username.as_bytes()))
            .await?;
        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::smtp_error(
                "AUTH LOGIN username",
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }

        self.transport
            .write_line(&STANDARD.encode(password.as_bytes()))
            .await?;
        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::AUTH_SUCCESS {
            return Err(Error::smtp_error(
                "AUTH LOGIN password",
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }

        debug!(mechanism = "LOGIN", "authenticated");
        Ok(())
    }

    /// Resets the current transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(&mut self) -> Result<()> {
        self.expect(&Command::Rset, ReplyCode::OK).await?;
        Ok(())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the NOOP command fails.
    pub async fn noop(&mut self) -> Result<()> {
        self.expect(&Command::Noop, ReplyCode::OK).await?;
        Ok(())
    }

    /// Sends QUIT and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.expect(&Command::Quit, ReplyCode::CLOSING).await;
        self.transport.close().await;
        result.map(|_| ())
    }

    async fn command(&mut self, command: &Command) -> Result<Reply> {
        self.transport.write_line(&command.to_string()).await?;
        self.read_reply().await
    }

    async fn expect(&mut self, command: &Command, code: ReplyCode) -> Result<Reply> {
        let reply = self.command(command).await?;
        if reply.code != code {
            return Err(Error::smtp_error(
                command.step(),
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }
        Ok(reply)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut accumulator = ReplyAccumulator::default();
        loop {
            let line = self.transport.read_line().await?;
            if let Some(reply) = accumulator.push(&line)? {
                return Ok(reply);
            }
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
    use tokio_test::io::Builder;

    fn plain_config() -> ClientConfig {
        ClientConfig::builder("localhost")
            .security(ClientSecurity::None)
            .build()
    }

    const EHLO_REPLY: &[u8] = b"250-localhost, greeting accepted.\r\n250-PIPELINING\r\n250-8BITMIME\r\n250 SIZE 100\r\n";

    #[tokio::test]
    async fn test_handshake_parses_ehlo() {
        let mock = Builder::new()
            .read(b"220 localhost ESMTP @typemail/smtp\r\n")
            .write(b"EHLO localhost\r\n")
            .read(EHLO_REPLY)
            .build();

        let client = Client::from_stream(mock, plain_config()).await.unwrap();
        assert!(client.is_ready());

        let info = client.server_info();
        assert_eq!(info.hostname, "localhost");
        assert_eq!(info.max_size, 100);
        assert!(info.supports("pipelining"));
        assert!(info.capabilities.contains("localhost, greeting accepted."));
        assert!(!info.capabilities.iter().any(|line| line.starts_with("SIZE")));
        assert!(info.extensions().contains(&Extension::EightBitMime));
    }

    #[tokio::test]
    async fn test_bad_greeting_is_fatal() {
        let mock = Builder::new()
            .read(b"554 go away\r\n")
            .build();
        let result = Client::from_stream(mock, plain_config()).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_empty_reply_line_is_fatal() {
        let mock = Builder::new().read(b"\r\n").build();
        let result = Client::from_stream(mock, plain_config()).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_falls_back_to_helo() {
        let mock = Builder::new()
            .read(b"220 old.example.com ready\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"502 Not implemented\r\n")
            .write(b"HELO localhost\r\n")
            .read(b"250 old.example.com\r\n")
            .build();

        let client = Client::from_stream(mock, plain_config()).await.unwrap();
        assert!(client.is_ready());
        assert_eq!(client.server_info().hostname, "old.example.com");
        assert!(client.server_info().capabilities.is_empty());
        assert_eq!(client.server_info().max_size, DEFAULT_MAX_SIZE);
    }

    #[tokio::test]
    async fn test_size_zero_is_unlimited() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-localhost\r\n250 SIZE 0\r\n")
            .build();

        let client = Client::from_stream(mock, plain_config()).await.unwrap();
        assert_eq!(client.server_info().max_size, usize::MAX);
    }

    #[tokio::test]
    async fn test_starttls_required_but_missing() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-localhost\r\n250 SIZE 1000\r\n")
            .build();

        let config = ClientConfig::builder("localhost")
            .security(ClientSecurity::StartTlsRequired)
            .build();
        let result = Client::from_stream(mock, config).await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_send_message() {
        let mock = Builder::new()
            .read(b"220 localhost ESMTP @typemail/smtp\r\n")
            .write(b"EHLO localhost\r\n")
            .read(EHLO_REPLY)
            .write(b"MAIL FROM:<a@localhost>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<b@localhost>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
            .write(b"Test\r\n..hidden\r\n.\r\n")
            .read(b"250 Ok\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 Bye\r\n")
            .build();

        let mut client = Client::from_stream(mock, plain_config()).await.unwrap();
        let message = Message::new("a@localhost", "Test\n.hidden").to("b@localhost");
        client.send(&message).await.unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_recipient_names_step() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(EHLO_REPLY)
            .write(b"MAIL FROM:<a@localhost>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<nobody@localhost>\r\n")
            .read(b"550 No such user\r\n")
            .build();

        let mut client = Client::from_stream(mock, plain_config()).await.unwrap();
        let message = Message::new("a@localhost", "Test").to("nobody@localhost");
        match client.send(&message).await {
            Err(Error::SmtpError {
                command,
                code,
                message,
            }) => {
                assert_eq!(command, "RCPT TO:<nobody@localhost>");
                assert_eq!(code, 550);
                assert_eq!(message, "No such user");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected_locally() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(EHLO_REPLY)
            .build();

        let mut client = Client::from_stream(mock, plain_config()).await.unwrap();
        let message = Message::new("a@localhost", "x".repeat(101)).to("b@localhost");
        assert!(matches!(
            client.send(&message).await,
            Err(Error::MessageTooLarge(100))
        ));
    }

    #[tokio::test]
    async fn test_auth_login() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-localhost\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 Authentication successful\r\n")
            .build();

        let mut client = Client::from_stream(mock, plain_config()).await.unwrap();
        client.auth_login("user", "pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_plain_rejected() {
        let mock = Builder::new()
            .read(b"220 localhost\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-localhost\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"535 Bad username or password\r\n")
            .build();

        let mut client = Client::from_stream(mock, plain_config()).await.unwrap();
        let err = client.auth_plain("user", "pass").await.unwrap_err();
        assert!(err.is_permanent());
    }
}
