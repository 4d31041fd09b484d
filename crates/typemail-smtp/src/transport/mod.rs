//! Line-oriented transport over plaintext or TLS streams.
//!
//! [`Transport`] owns the byte stream for one SMTP conversation. It reads
//! CRLF-terminated lines, reads size-bounded DATA bodies and swaps the
//! underlying stream for a TLS stream in place when STARTTLS succeeds.

#![allow(clippy::missing_errors_doc)]

pub mod tls;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::types::CRLF;

/// Longest line accepted outside of DATA, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A stream that can be either plaintext or TLS.
pub enum Stream<S> {
    /// Plaintext stream.
    Plain(S),
    /// TLS stream accepted by a server (boxed to reduce enum size).
    ServerTls(Box<tokio_rustls::server::TlsStream<S>>),
    /// TLS stream initiated by a client (boxed to reduce enum size).
    ClientTls(Box<tokio_rustls::client::TlsStream<S>>),
}

impl<S> Stream<S> {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for Stream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::ServerTls(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::ClientTls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for Stream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::ServerTls(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::ClientTls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::ServerTls(stream) => Pin::new(stream).poll_flush(cx),
            Self::ClientTls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::ServerTls(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::ClientTls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Buffered line transport for one SMTP conversation.
///
/// Once closed (by either side) every operation fails with
/// [`Error::ConnectionClosed`].
pub struct Transport<S> {
    inner: Option<BufReader<Stream<S>>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> std::fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("open", &self.is_open())
            .field("secure", &self.is_secure())
            .finish()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport<S> {
    /// Wraps a plaintext stream.
    pub fn new(stream: S) -> Self {
        Self::from_stream(Stream::Plain(stream))
    }

    /// Wraps a stream that may already be encrypted.
    pub fn from_stream(stream: Stream<S>) -> Self {
        Self {
            inner: Some(BufReader::new(stream)),
        }
    }

    /// Reads one line, without its terminator.
    ///
    /// Both CRLF and bare LF terminate a line.
    pub async fn read_line(&mut self) -> Result<String> {
        let line = self.read_limited(MAX_LINE_LENGTH).await?;
        trace!(%line, "recv");
        Ok(line)
    }

    /// Reads a DATA body up to the lone `.` line.
    ///
    /// Returns the lines joined with CRLF, still dot-stuffed. Fails with
    /// [`Error::MessageTooLarge`] as soon as the body grows past `max_size`
    /// bytes; the rest of the body is left unread.
    pub async fn read_data(&mut self, max_size: usize) -> Result<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut size = 0usize;

        loop {
            // Bounded by the allowance only; room for the terminator even when
            // the allowance is spent.
            let limit = max_size.saturating_sub(size).saturating_add(1);

            let line = match self.read_limited(limit).await {
                Err(Error::LineTooLong(_)) => return Err(Error::MessageTooLarge(max_size)),
                other => other?,
            };

            if line == "." {
                trace!(size, lines = lines.len(), "data complete");
                return Ok(lines.join(CRLF));
            }

            size += line.len() + if lines.is_empty() { 0 } else { CRLF.len() };
            if size > max_size {
                return Err(Error::MessageTooLarge(max_size));
            }
            lines.push(line);
        }
    }

    async fn read_limited(&mut self, limit: usize) -> Result<String> {
        let reader = self.inner.as_mut().ok_or(Error::ConnectionClosed)?;

        // Content plus CRLF.
        let cap = limit.saturating_add(2);
        let mut buf = Vec::new();
        let read = (&mut *reader)
            .take(cap as u64)
            .read_until(b'\n', &mut buf)
            .await;

        let n = match read {
            Ok(n) => n,
            Err(err) => {
                self.inner = None;
                return Err(err.into());
            }
        };

        if n == 0 {
            self.inner = None;
            return Err(Error::ConnectionClosed);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() >= cap {
            return Err(Error::LineTooLong(limit));
        }

        if buf.len() > limit {
            return Err(Error::LineTooLong(limit));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Writes one line followed by CRLF and flushes.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self.inner.as_mut().ok_or(Error::ConnectionClosed)?;
        trace!(%line, "send");

        let framed = format!("{line}{CRLF}");
        let written = async {
            writer.write_all(framed.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(err) = written {
            self.inner = None;
            return Err(err.into());
        }
        Ok(())
    }

    /// Shuts the stream down. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.inner.take()
            && let Err(err) = stream.shutdown().await
        {
            trace!(error = %err, "shutdown failed");
        }
    }

    /// Returns true until the transport is closed.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|reader| reader.get_ref().is_tls())
    }

    /// Performs the server side of a TLS handshake on the current stream.
    ///
    /// A failed handshake leaves the transport closed.
    pub async fn upgrade_server(&mut self, acceptor: &TlsAcceptor) -> Result<()> {
        let plain = self.take_plain()?;
        let tls = acceptor.accept(plain).await?;
        self.inner = Some(BufReader::new(Stream::ServerTls(Box::new(tls))));
        Ok(())
    }

    /// Performs the client side of a TLS handshake on the current stream.
    ///
    /// A failed handshake leaves the transport closed.
    pub async fn upgrade_client(&mut self, connector: &TlsConnector, host: &str) -> Result<()> {
        let server_name = server_name(host)?;
        let plain = self.take_plain()?;
        let tls = connector.connect(server_name, plain).await?;
        self.inner = Some(BufReader::new(Stream::ClientTls(Box::new(tls))));
        Ok(())
    }

    fn take_plain(&mut self) -> Result<S> {
        let reader = self.inner.take().ok_or(Error::ConnectionClosed)?;
        if reader.get_ref().is_tls() {
            self.inner = Some(reader);
            return Err(Error::InvalidState("Stream is already TLS".to_string()));
        }

        if !reader.buffer().is_empty() {
            warn!(
                bytes = reader.buffer().len(),
                "discarding plaintext received before TLS handshake"
            );
        }

        match reader.into_inner() {
            Stream::Plain(stream) => Ok(stream),
            Stream::ServerTls(_) | Stream::ClientTls(_) => {
                Err(Error::InvalidState("Stream is already TLS".to_string()))
            }
        }
    }
}

fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {host}")))
}

/// Connects to a server without TLS (for STARTTLS or testing).
pub async fn connect(host: &str, port: u16) -> Result<Transport<TcpStream>> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    Ok(Transport::new(tcp))
}

/// Connects to a server with TLS from the start.
pub async fn connect_tls(
    host: &str,
    port: u16,
    connector: &TlsConnector,
) -> Result<Transport<TcpStream>> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    let tls = connector.connect(server_name(host)?, tcp).await?;
    Ok(Transport::from_stream(Stream::ClientTls(Box::new(tls))))
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

    #[tokio::test]
    async fn reads_crlf_and_lf_lines() {
        let mock = Builder::new().read(b"EHLO localhost\r\nNOOP\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_line().await.unwrap(), "EHLO localhost");
        assert_eq!(transport.read_line().await.unwrap(), "NOOP");
    }

    #[tokio::test]
    async fn eof_closes() {
        let mock = Builder::new().read(b"QUIT\r\n").build();
        let mut transport = Transport::new(mock);
        transport.read_line().await.unwrap();
        assert!(matches!(
            transport.read_line().await,
            Err(Error::ConnectionClosed)
        ));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn writes_crlf_terminated_lines() {
        let mock = Builder::new().write(b"250 Ok\r\n").build();
        let mut transport = Transport::new(mock);
        transport.write_line("250 Ok").await.unwrap();
    }

    #[tokio::test]
    async fn reads_data_until_terminator() {
        let mock = Builder::new()
            .read(b"Subject: hi\r\n\r\n..dots\r\n.\r\nQUIT\r\n")
            .build();
        let mut transport = Transport::new(mock);
        let body = transport.read_data(1000).await.unwrap();
        assert_eq!(body, "Subject: hi\r\n\r\n..dots");
        assert_eq!(transport.read_line().await.unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn data_within_exact_limit() {
        let mock = Builder::new().read(b"abcd\r\nef\r\n.\r\n").build();
        let mut transport = Transport::new(mock);
        assert_eq!(transport.read_data(8).await.unwrap(), "abcd\r\nef");
    }

    #[tokio::test]
    async fn data_over_limit_fails() {
        let mock = Builder::new().read(b"abcd\r\nefg\r\n").build();
        let mut transport = Transport::new(mock);
        assert!(matches!(
            transport.read_data(8).await,
            Err(Error::MessageTooLarge(8))
        ));
    }

    #[tokio::test]
    async fn oversized_data_line_fails_before_newline() {
        let mock = Builder::new().read(b"0123456789abcdef").build();
        let mut transport = Transport::new(mock);
        assert!(matches!(
            transport.read_data(4).await,
            Err(Error::MessageTooLarge(4))
        ));
    }

    #[tokio::test]
    async fn data_line_longer_than_command_limit() {
        let line = "x".repeat(MAX_LINE_LENGTH + 10);
        let wire = format!("{line}\r\n.\r\n");
        let mock = Builder::new().read(wire.as_bytes()).build();
        let mut transport = Transport::new(mock);
        let body = transport.read_data(MAX_LINE_LENGTH * 2).await.unwrap();
        assert_eq!(body.len(), MAX_LINE_LENGTH + 10);
    }

    #[tokio::test]
    async fn plain_transport_is_not_secure() {
        let mock = Builder::new().build();
        let mut transport = Transport::new(mock);
        assert!(transport.is_open());
        assert!(!transport.is_secure());
        transport.close().await;
        assert!(!transport.is_open());
        assert!(matches!(
            transport.write_line("NOOP").await,
            Err(Error::ConnectionClosed)
        ));
    }
}
