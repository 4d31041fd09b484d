//! TCP accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::auth::{Authenticator, NoAuth};
use super::config::{SecureMode, ServerConfig};
use super::connection::Connection;
use super::event::ServerEvent;
use crate::error::Result;
use crate::transport::{Stream, Transport};

/// SMTP server bound to a TCP listener.
pub struct Server<A: Authenticator = NoAuth> {
    listener: TcpListener,
    config: Arc<ServerConfig<A>>,
}

impl<A: Authenticator> Server<A> {
    /// Binds a listener to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs, config: ServerConfig<A>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Serves on an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener, config: ServerConfig<A>) -> Self {
        Self {
            listener,
            config: Arc::new(config),
        }
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` turns true or its sender is
    /// dropped.
    ///
    /// On shutdown, idle connections receive `421` and the call returns once
    /// every connection task has finished.
    ///
    /// # Errors
    ///
    /// Currently infallible; accept failures are reported as
    /// [`ServerEvent::Error`].
    pub async fn serve(
        self,
        events: mpsc::UnboundedSender<ServerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (stop, stopped) = watch::channel(false);
        let mut tasks = JoinSet::new();

        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "listening");
        }

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "connection accepted");
                        if events.send(ServerEvent::Accepted { peer }).is_err() {
                            debug!("server event receiver dropped");
                        }
                        tasks.spawn(handle_connection(
                            stream,
                            peer,
                            Arc::clone(&self.config),
                            events.clone(),
                            stopped.clone(),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        if events.send(ServerEvent::Error(err.into())).is_err() {
                            debug!("server event receiver dropped");
                        }
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "connection task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(connections = tasks.len(), "shutting down");
        drop(self.listener);
        stop.send_replace(true);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "connection task failed");
            }
        }
        Ok(())
    }
}

async fn handle_connection<A: Authenticator>(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig<A>>,
    events: mpsc::UnboundedSender<ServerEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let transport = match (&config.tls, config.secure_mode) {
        (Some(acceptor), SecureMode::Tls) => match acceptor.accept(stream).await {
            Ok(tls) => Transport::from_stream(Stream::ServerTls(Box::new(tls))),
            Err(err) => {
                warn!(%peer, error = %err, "TLS handshake failed");
                if events.send(ServerEvent::Error(err.into())).is_err() {
                    debug!("server event receiver dropped");
                }
                return;
            }
        },
        _ => Transport::new(stream),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = match Connection::accept_transport(transport, config, tx).await {
        Ok(connection) => connection.with_shutdown(shutdown),
        Err(err) => {
            warn!(%peer, error = %err, "greeting failed");
            if events.send(ServerEvent::Error(err)).is_err() {
                debug!("server event receiver dropped");
            }
            return;
        }
    };

    let forward = async {
        while let Some(event) = rx.recv().await {
            if events.send(ServerEvent::Connection { peer, event }).is_err() {
                break;
            }
        }
    };

    let (state, ()) = tokio::join!(connection.run(), forward);
    debug!(%peer, authenticated = state.authenticated, "connection finished");
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
    use crate::server::event::ConnectionEvent;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_accepts_and_shuts_down() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let serving = tokio::spawn(server.serve(events_tx, shutdown_rx));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "220 localhost ESMTP @typemail/smtp\r\n");

        assert!(matches!(
            events_rx.recv().await,
            Some(ServerEvent::Accepted { .. })
        ));

        shutdown_tx.send(true).unwrap();

        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "421 The server is shutting down\r\n");

        serving.await.unwrap().unwrap();

        let mut closed = false;
        while let Some(event) = events_rx.recv().await {
            if let ServerEvent::Connection {
                event: ConnectionEvent::Closed,
                ..
            } = event
            {
                closed = true;
            }
        }
        assert!(closed);
    }
}
