//! SMTP server: per-connection state machine and TCP listener.

mod auth;
mod config;
mod connection;
mod event;
mod listener;
mod state;

pub use auth::{Authenticator, Credentials, NoAuth};
pub use config::{DEFAULT_MAX_SIZE, SecureMode, ServerConfig, ServerConfigBuilder};
pub use connection::Connection;
pub use event::{ConnectionEvent, ServerEvent};
pub use listener::Server;
pub use state::ConnectionState;
