//! Events emitted by server connections.

use std::net::SocketAddr;

use crate::error::Error;
use crate::types::Message;

/// Event emitted by a single connection, in processing order.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A DATA transaction completed.
    Message(Message),
    /// MAIL was refused because the declared size exceeded the limit.
    Rejected {
        /// Sender named in the refused MAIL command.
        sender: String,
        /// Recipients accumulated so far.
        recipients: Vec<String>,
    },
    /// The transport failed.
    Error(Error),
    /// The connection is closed. Always the last event.
    Closed,
}

/// Event emitted by a [`Server`](super::Server).
#[derive(Debug)]
pub enum ServerEvent {
    /// A client connected.
    Accepted {
        /// Remote address.
        peer: SocketAddr,
    },
    /// An event from the connection with `peer`.
    Connection {
        /// Remote address.
        peer: SocketAddr,
        /// Connection event.
        event: ConnectionEvent,
    },
    /// A connection could not be set up.
    Error(Error),
}
