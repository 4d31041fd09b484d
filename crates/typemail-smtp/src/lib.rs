//! # typemail-smtp
//!
//! An SMTP protocol engine: an embeddable server that turns inbound
//! transactions into [`Message`] events, and a client that sends them.
//!
//! ## Features
//!
//! - **Server**: HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, QUIT, STARTTLS and
//!   AUTH (PLAIN, LOGIN) with a pluggable [`server::Authenticator`]
//! - **Client**: EHLO with HELO fallback, opportunistic or mandatory STARTTLS,
//!   implicit TLS, AUTH PLAIN/LOGIN
//! - **Extensions**: 8BITMIME, SIZE, PIPELINING, SMTPUTF8
//! - **Direct delivery**: [`router::sendmail`] groups recipients by domain and
//!   delivers to each domain's MX host
//!
//! ## Server
//!
//! ```ignore
//! use tokio::sync::{mpsc, watch};
//! use typemail_smtp::server::{ConnectionEvent, Server, ServerConfig, ServerEvent};
//!
//! #[tokio::main]
//! async fn main() -> typemail_smtp::Result<()> {
//!     let config = ServerConfig::builder().hostname("mx.example.com").build()?;
//!     let server = Server::bind("0.0.0.0:2525", config).await?;
//!
//!     let (events, mut received) = mpsc::unbounded_channel();
//!     let (_shutdown, stop) = watch::channel(false);
//!     tokio::spawn(server.serve(events, stop));
//!
//!     while let Some(event) = received.recv().await {
//!         if let ServerEvent::Connection { event: ConnectionEvent::Message(message), .. } = event {
//!             println!("{} -> {:?}", message.sender, message.recipients);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Client
//!
//! ```ignore
//! use typemail_smtp::{Client, ClientConfig, Message};
//!
//! #[tokio::main]
//! async fn main() -> typemail_smtp::Result<()> {
//!     let mut client = Client::connect(ClientConfig::new("mx.example.com")).await?;
//!
//!     let message = Message::new("a@example.com", "Subject: Test\r\n\r\nHello!")
//!         .to("b@example.com");
//!     client.send(&message).await?;
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Client driver and configuration
//! - [`command`]: Client commands and server-side verb parsing
//! - [`parser`]: Reply and argument parsers
//! - [`router`]: Per-domain delivery
//! - [`server`]: Connection state machine and listener
//! - [`transport`]: Line transport with TLS upgrade
//! - [`types`]: Core SMTP types (addresses, extensions, messages, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
mod error;
pub mod parser;
pub mod router;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{Client, ClientConfig, ClientSecurity, ServerInfo};
pub use error::{Error, Result};
pub use router::{SendmailOptions, sendmail};
pub use types::{Address, AuthMechanism, Extension, Message, Reply, ReplyCode};
