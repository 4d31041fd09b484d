//! Server side of one SMTP conversation.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::auth::{self, Authenticator, Credentials, NoAuth};
use super::config::{SecureMode, ServerConfig};
use super::event::ConnectionEvent;
use super::state::ConnectionState;
use crate::command::{Verb, split_command};
use crate::error::{Error, Result};
use crate::parser::parse_arguments;
use crate::transport::Transport;
use crate::types::{AuthMechanism, Extension, Message, Reply, ReplyCode, replies, unstuff};

/// One accepted SMTP connection.
///
/// Commands are processed strictly in arrival order. Events go out on the
/// channel passed to [`Connection::accept`], ending with
/// [`ConnectionEvent::Closed`].
pub struct Connection<S, A: Authenticator = NoAuth> {
    transport: Transport<S>,
    config: Arc<ServerConfig<A>>,
    state: ConnectionState<A::State>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S, A> Connection<S, A>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    A: Authenticator,
{
    /// Accepts a plaintext stream and sends the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be written.
    pub async fn accept(
        stream: S,
        config: Arc<ServerConfig<A>>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self> {
        Self::accept_transport(Transport::new(stream), config, events).await
    }

    /// Accepts a transport, which may already be encrypted, and sends the
    /// greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be written.
    pub async fn accept_transport(
        transport: Transport<S>,
        config: Arc<ServerConfig<A>>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self> {
        let mut state = ConnectionState::new(config.max_size);
        state.secure = transport.is_secure();

        let mut connection = Self {
            transport,
            config,
            state,
            events,
            shutdown: None,
        };

        let banner = format!(
            "{} ESMTP {}",
            connection.config.hostname, connection.config.product
        );
        connection
            .reply(Reply::single(ReplyCode::SERVICE_READY, banner))
            .await?;
        Ok(connection)
    }

    /// Stops the connection with `421` once `shutdown` turns true.
    ///
    /// The signal is only observed while waiting for a command.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns the current connection state.
    #[must_use]
    pub const fn state(&self) -> &ConnectionState<A::State> {
        &self.state
    }

    /// Processes commands until the connection closes.
    ///
    /// Returns the final state.
    pub async fn run(mut self) -> ConnectionState<A::State> {
        match self.serve().await {
            Ok(()) | Err(Error::ConnectionClosed) => {}
            Err(err) => {
                warn!(error = %err, "connection failed");
                self.emit(ConnectionEvent::Error(err));
            }
        }

        self.transport.close().await;
        self.state.open = false;
        debug!("connection closed");
        self.emit(ConnectionEvent::Closed);
        self.state
    }

    async fn serve(&mut self) -> Result<()> {
        while self.transport.is_open() {
            let Some(line) = self.next_line().await? else {
                debug!("shutting down");
                self.reply(replies::SERVER_SHUTTING_DOWN).await?;
                self.transport.close().await;
                break;
            };
            self.handle(&line).await?;
        }
        Ok(())
    }

    /// Waits for the next command. `None` means shutdown was requested.
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let Some(shutdown) = self.shutdown.as_mut() else {
                return self.transport.read_line().await.map(Some);
            };
            if *shutdown.borrow_and_update() {
                return Ok(None);
            }

            let signal_lost = tokio::select! {
                line = self.transport.read_line() => return line.map(Some),
                changed = shutdown.changed() => changed.is_err(),
            };
            if signal_lost {
                self.shutdown = None;
            }
        }
    }

    async fn handle(&mut self, line: &str) -> Result<()> {
        let (verb, args) = split_command(line);

        match verb {
            Verb::Quit => {
                self.reply(replies::BYE).await?;
                self.transport.close().await;
            }
            Verb::Noop => self.reply(replies::OK).await?,
            Verb::Helo | Verb::Ehlo if self.state.greeted => {
                self.reply(replies::BAD_SEQUENCE).await?;
            }
            Verb::Helo => {
                self.reply(Reply::single(ReplyCode::OK, self.greeting()))
                    .await?;
                self.state.greeted = true;
            }
            Verb::Ehlo => {
                let mut lines = vec![self.greeting()];
                lines.extend(self.extensions().iter().map(ToString::to_string));
                self.reply(Reply::new(ReplyCode::OK, lines)).await?;
                self.state.greeted = true;
            }
            _ if !self.state.greeted => self.reply(replies::BAD_SEQUENCE).await?,
            Verb::StartTls => self.starttls().await?,
            Verb::Mail => self.mail(args).await?,
            Verb::Rcpt => self.rcpt(args).await?,
            Verb::Data => self.data().await?,
            Verb::Auth => self.auth(args).await?,
            Verb::Rset => {
                self.state.reset_transaction();
                self.reply(replies::OK).await?;
            }
            Verb::Unknown(_) => self.reply(replies::NOT_IMPLEMENTED).await?,
        }
        Ok(())
    }

    fn greeting(&self) -> String {
        format!("{}, greeting accepted.", self.config.hostname)
    }

    fn extensions(&self) -> Vec<Extension> {
        let mut extensions = vec![
            Extension::SmtpUtf8,
            Extension::Pipelining,
            Extension::EightBitMime,
        ];
        if self.config.tls.is_some() && !self.state.secure {
            extensions.push(Extension::StartTls);
        }
        let methods = self.config.offered_auth_methods();
        if !methods.is_empty() {
            extensions.push(Extension::Auth(methods.to_vec()));
        }
        extensions.push(Extension::Size(Some(self.state.max_size)));
        extensions
    }

    async fn starttls(&mut self) -> Result<()> {
        let allowed = self.config.secure_mode == SecureMode::StartTls;
        let Some(acceptor) = self.config.tls.clone().filter(|_| allowed) else {
            return self.reply(replies::NOT_IMPLEMENTED).await;
        };
        if self.state.secure {
            return self.reply(replies::BAD_SEQUENCE).await;
        }

        self.reply(replies::TLS_GO_AHEAD).await?;
        self.state.greeted = false;
        self.transport.upgrade_server(&acceptor).await?;
        self.state.secure = true;
        debug!("TLS established");
        Ok(())
    }

    async fn mail(&mut self, args: &str) -> Result<()> {
        let args = parse_arguments(args);
        let Some(sender) = args.get("FROM").filter(|from| !from.is_empty()).cloned() else {
            return self.reply(replies::SYNTAX_ERROR_ARGUMENT).await;
        };

        let declared = args
            .get("SIZE")
            .and_then(|size| size.parse::<usize>().ok())
            .unwrap_or(0);
        if declared > self.state.max_size {
            debug!(declared, max_size = self.state.max_size, "declared size too large");
            self.reply(replies::MAXIMUM_SIZE_EXCEEDED).await?;
            self.emit(ConnectionEvent::Rejected {
                sender,
                recipients: self.state.recipients.clone(),
            });
            return Ok(());
        }

        self.state.sender = Some(sender);
        self.reply(replies::OK).await
    }

    async fn rcpt(&mut self, args: &str) -> Result<()> {
        if self.state.sender.is_none() {
            return self.reply(replies::BAD_SEQUENCE).await;
        }

        let mut args = parse_arguments(args);
        let Some(recipient) = args.remove("TO").filter(|to| !to.is_empty()) else {
            return self.reply(replies::SYNTAX_ERROR_ARGUMENT).await;
        };

        self.state.recipients.push(recipient);
        self.reply(replies::OK).await
    }

    async fn data(&mut self) -> Result<()> {
        if self.state.recipients.is_empty() || self.state.sender.is_none() {
            return self.reply(replies::BAD_SEQUENCE).await;
        }

        self.reply(replies::START_MAIL_INPUT).await?;
        let body = match self.transport.read_data(self.state.max_size).await {
            Ok(body) => body,
            Err(Error::MessageTooLarge(max_size)) => {
                debug!(max_size, "message body too large");
                self.state.reset_transaction();
                return self.reply(replies::MAXIMUM_SIZE_EXCEEDED).await;
            }
            Err(err) => return Err(err),
        };

        let recipients = std::mem::take(&mut self.state.recipients);
        let Some(sender) = self.state.sender.take() else {
            return self.reply(replies::BAD_SEQUENCE).await;
        };

        let message = Message {
            sender,
            recipients,
            message: unstuff(&body),
        };
        info!(
            sender = %message.sender,
            recipients = message.recipients.len(),
            size = message.message.len(),
            "message received"
        );
        self.emit(ConnectionEvent::Message(message));
        self.reply(replies::OK).await
    }

    async fn auth(&mut self, args: &str) -> Result<()> {
        let mut parts = args.split(' ');
        let mechanism = parts.next().unwrap_or_default().to_ascii_uppercase();
        let rest: Vec<String> = parts.map(str::to_string).collect();

        let offered = self.config.offered_auth_methods().contains(&mechanism);
        let Some(authenticator) = self.config.authenticator.clone().filter(|_| offered) else {
            return self.reply(replies::NOT_IMPLEMENTED_ARGUMENT).await;
        };

        let (identity, username, password) = match AuthMechanism::parse(&mechanism) {
            Some(AuthMechanism::Plain) => {
                let inline = rest.first().map(|payload| auth::decode(payload));
                let payload = match inline {
                    Some(payload) if !payload.is_empty() => payload,
                    _ => self.challenge("").await,
                };
                auth::split_plain(&payload)
            }
            Some(AuthMechanism::Login) => {
                let inline = rest.first().map(|payload| auth::decode(payload));
                let username = match inline {
                    Some(username) if !username.is_empty() => username,
                    _ => self.challenge("Username:").await,
                };
                let password = self.challenge("Password:").await;
                (String::new(), username, password)
            }
            None => (String::new(), String::new(), String::new()),
        };

        let credentials = if username.is_empty() || password.is_empty() {
            Credentials::Raw(rest)
        } else {
            Credentials::Password {
                username,
                password,
                identity,
            }
        };

        let verdict = authenticator
            .verify(&mut self.state, &mechanism, credentials)
            .await;
        self.state.authenticated = verdict;
        debug!(mechanism = %mechanism, authenticated = verdict, "authentication verdict");

        if verdict {
            self.reply(replies::AUTHENTICATION_SUCCESSFUL).await
        } else {
            self.reply(replies::BAD_USERNAME_OR_PASSWORD).await
        }
    }

    /// Sends a base64 `334` prompt and returns the decoded answer.
    ///
    /// Any transport failure resolves to an empty answer.
    async fn challenge(&mut self, prompt: &str) -> String {
        let sent = self
            .reply(Reply::single(ReplyCode::AUTH_CONTINUE, auth::encode(prompt)))
            .await;
        if let Err(err) = sent {
            debug!(error = %err, "challenge not sent");
            return String::new();
        }

        match self.transport.read_line().await {
            Ok(answer) => auth::decode(&answer),
            Err(err) => {
                debug!(error = %err, "challenge aborted");
                String::new()
            }
        }
    }

    /// Writes a reply. Codes of 500 and above close the transport.
    async fn reply(&mut self, reply: impl Into<Reply>) -> Result<()> {
        let reply = reply.into();
        if !self.transport.is_open() {
            trace!(code = %reply.code, "reply dropped on closed transport");
            return Ok(());
        }

        for line in reply.to_lines() {
            self.transport.write_line(&line).await?;
        }

        if reply.code.closes_connection() {
            debug!(code = %reply.code, "closing after permanent failure");
            self.transport.close().await;
        }
        Ok(())
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
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

    async fn run_script(script: tokio_test::io::Mock) -> Vec<ConnectionEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = Arc::new(ServerConfig::default());
        let connection = Connection::accept(script, config, tx).await.unwrap();
        let state = connection.run().await;
        assert!(!state.open);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn greets_and_quits() {
        let script = Builder::new()
            .write(b"220 localhost ESMTP @typemail/smtp\r\n")
            .read(b"QUIT\r\n")
            .write(b"221 Bye\r\n")
            .build();
        let events = run_script(script).await;
        assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
    }

    #[tokio::test]
    async fn commands_before_greeting_are_out_of_sequence() {
        let script = Builder::new()
            .write(b"220 localhost ESMTP @typemail/smtp\r\n")
            .read(b"NOOP\r\n")
            .write(b"250 Ok\r\n")
            .read(b"MAIL FROM:<a@localhost>\r\n")
            .write(b"503 Bad sequence of commands\r\n")
            .build();
        let events = run_script(script).await;
        assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
    }

    #[tokio::test]
    async fn helo_then_transaction() {
        let script = Builder::new()
            .write(b"220 localhost ESMTP @typemail/smtp\r\n")
            .read(b"helo client\r\n")
            .write(b"250 localhost, greeting accepted.\r\n")
            .read(b"MAIL FROM:<a@localhost>\r\n")
            .write(b"250 Ok\r\n")
            .read(b"RCPT TO:<b@localhost>\r\n")
            .write(b"250 Ok\r\n")
            .read(b"DATA\r\n")
            .write(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
            .read(b"Test\r\n.\r\n")
            .write(b"250 Ok\r\n")
            .build();
        let events = run_script(script).await;
        match events.as_slice() {
            [ConnectionEvent::Message(message), ConnectionEvent::Closed] => {
                assert_eq!(message.sender, "a@localhost");
                assert_eq!(message.recipients, vec!["b@localhost"]);
                assert_eq!(message.message, "Test");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_command_is_fatal() {
        let script = Builder::new()
            .write(b"220 localhost ESMTP @typemail/smtp\r\n")
            .read(b"HELO client\r\n")
            .write(b"250 localhost, greeting accepted.\r\n")
            .read(b"VRFY postmaster\r\n")
            .write(b"502 Not implemented\r\n")
            .build();
        let events = run_script(script).await;
        assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
    }
}
