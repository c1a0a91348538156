//! SMTP client with a single session deadline.

use std::{sync::Arc, time::Duration};

use mailprobe_common::{incoming, outgoing};
use tokio::{
    net::TcpStream,
    time::{Instant, timeout, timeout_at},
};
use tokio_rustls::rustls::{ClientConfig, pki_types::ServerName};

use super::{connection::ClientConnection, response::Response};
use crate::error::{ClientError, Result};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client for sending commands and receiving responses.
///
/// Every read, write and handshake is bounded by the same `deadline`, which
/// is fixed when the client is created and never extended.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    deadline: Instant,
}

impl SmtpClient {
    /// Opens a TCP connection, bounded by `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if the dial does not finish in time and
    /// `ClientError::Connect` if it fails.
    pub async fn dial(addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
        timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(ClientError::Connect)
    }

    /// Wraps an established connection. All later I/O must finish before
    /// `deadline`.
    #[must_use]
    pub fn new(stream: TcpStream, deadline: Instant) -> Self {
        Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            deadline,
        }
    }

    /// Sends a command to the server, terminated with CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the deadline passes.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{}", command);
        let data = format!("{command}\r\n");
        self.send(data.as_bytes()).await
    }

    /// Sends a message body followed by the end-of-data marker.
    ///
    /// Lines starting with a dot are dot-stuffed, and a missing final line
    /// ending is added, so the server always sees `<CRLF>.<CRLF>`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the deadline passes.
    pub async fn send_payload(&mut self, body: &str) -> Result<()> {
        outgoing!("<{} bytes of message data>", body.len());
        let payload = encode_payload(body);
        self.send(payload.as_bytes()).await
    }

    /// Reads one complete SMTP response from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, the deadline passes, or the
    /// response is malformed.
    pub async fn read_response(&mut self) -> Result<Response> {
        loop {
            // Try to parse a complete response from the buffer
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                // Remove consumed bytes from buffer
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            // Need more data - read from connection
            if self.buffer_pos >= self.buffer.len() {
                // Buffer is full but no complete response - expand buffer
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let deadline = self.deadline;
            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = bounded(
                deadline,
                connection.read(&mut self.buffer[self.buffer_pos..]),
            )
            .await?;
            self.buffer_pos += n;
        }
    }

    /// Reads a response and checks it carries `expected`.
    ///
    /// # Errors
    ///
    /// As [`read_response`](Self::read_response), plus
    /// `ClientError::UnexpectedResponse` on a code mismatch.
    pub async fn expect(&mut self, expected: u16) -> Result<Response> {
        self.read_response().await?.expect(expected)
    }

    /// Replaces the plaintext connection with a TLS session over the same
    /// socket. Any bytes the server sent before the handshake are discarded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::TlsError` if the handshake fails and
    /// `ClientError::Timeout` if it does not finish before the deadline.
    pub async fn upgrade_to_tls(
        &mut self,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<()> {
        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;

        self.buffer_pos = 0;
        let upgraded = bounded(
            self.deadline,
            connection.upgrade_to_tls(config, server_name),
        )
        .await?;
        self.connection = Some(upgraded);

        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.deadline;
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        bounded(deadline, connection.send(data)).await
    }
}

async fn bounded<T>(deadline: Instant, operation: impl Future<Output = Result<T>>) -> Result<T> {
    timeout_at(deadline, operation)
        .await
        .map_err(|_| ClientError::Timeout)?
}

fn encode_payload(body: &str) -> String {
    let mut payload = String::with_capacity(body.len() + 8);

    for line in body.split_inclusive('\n') {
        if line.starts_with('.') {
            payload.push('.');
        }

        let content = line
            .strip_suffix('\n')
            .map_or(line, |content| content.strip_suffix('\r').unwrap_or(content));
        payload.push_str(content);
        payload.push_str("\r\n");
    }

    payload.push_str(".\r\n");
    payload
}
