//! Shared helpers: an in-memory server connection and a raw line peer.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use typemail_smtp::server::{
    Authenticator, Connection, ConnectionEvent, ConnectionState, Credentials, ServerConfig,
};

/// Installs a log subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Server connection running on one end of an in-memory pipe.
///
/// The handle resolves to every event the connection emitted, once it has
/// closed.
pub fn spawn_connection<A: Authenticator>(
    config: ServerConfig<A>,
) -> (DuplexStream, JoinHandle<Vec<ConnectionEvent>>) {
    init_tracing();
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let connection = Connection::accept(server_io, Arc::new(config), tx)
            .await
            .unwrap();
        let state = connection.run().await;
        assert!(!state.open);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    (client_io, handle)
}

/// Raw SMTP peer speaking lines over a stream.
pub struct Peer {
    reader: BufReader<DuplexStream>,
}

impl Peer {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.reader
            .get_mut()
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Reads one line without its CRLF. Returns `None` at end of stream.
    pub async fn line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.unwrap();
        (read > 0).then(|| line.trim_end_matches("\r\n").to_string())
    }

    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.line().await.as_deref(), Some(expected));
    }

    /// Reads a complete, possibly multi-line, reply.
    pub async fn reply(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.line().await.unwrap();
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);
            if last {
                return lines;
            }
        }
    }

    pub async fn command(&mut self, line: &str, expected: &str) {
        self.send(line).await;
        self.expect(expected).await;
    }

    pub async fn expect_closed(&mut self) {
        assert_eq!(self.line().await, None);
    }
}

/// Accepts `user` / `pass` and counts attempts per connection.
pub struct Accounts;

#[derive(Debug, Default)]
pub struct Attempts {
    pub count: u32,
    pub last_username: Option<String>,
}

impl Authenticator for Accounts {
    type State = Attempts;

    async fn verify(
        &self,
        state: &mut ConnectionState<Attempts>,
        _mechanism: &str,
        credentials: Credentials,
    ) -> bool {
        state.extra.count += 1;
        match credentials {
            Credentials::Password {
                username, password, ..
            } => {
                let accepted = username == "user" && password == "pass";
                state.extra.last_username = Some(username);
                accepted
            }
            Credentials::Raw(_) => false,
        }
    }
}
