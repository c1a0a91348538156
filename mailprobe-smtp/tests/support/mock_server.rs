//! Scripted SMTP server for probe session tests
//!
//! The server answers each command with a configurable reply and can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Stay silent instead of greeting, to exercise the read deadline
//! - Hang on the Nth command
//! - Upgrade the connection with STARTTLS using the PEM fixtures
//! - Record every command it receives for later inspection
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_ehlo_response(421, vec!["Service not available".to_string()])
//!     .build()
//!     .await?;
//!
//! // Point a probe at server.addr() ...
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write as _,
    fs::File,
    io::BufReader as StdBufReader,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content (after DATA), without the end-of-data marker
    MessageContent(Vec<u8>),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            if i < cap_count - 1 {
                let _ = write!(&mut response, "{}-{}\r\n", self.code, cap);
            } else {
                let _ = write!(&mut response, "{} {}\r\n", self.code, cap);
            }
        }

        response.into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: Option<SmtpResponse>,
    ehlo_response: EhloResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls: Option<TlsAcceptor>,

    // Failure injection
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Some(SmtpResponse::new(220, "myhostname ESMTP Mock")),
            ehlo_response: EhloResponse {
                code: 250,
                capabilities: [
                    "myhostname",
                    "PIPELINING",
                    "SIZE 10240000",
                    "STARTTLS",
                    "ENHANCEDSTATUSCODES",
                    "8BITMIME",
                    "SMTPUTF8",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            },
            mail_from_response: SmtpResponse::new(250, "2.1.0 Ok"),
            rcpt_to_response: SmtpResponse::new(250, "2.1.5 Ok"),
            data_response: SmtpResponse::new(354, "End data with <CR><LF>.<CR><LF>"),
            data_end_response: SmtpResponse::new(250, "2.0.0 Ok: queued as C7CAA3F279"),
            quit_response: SmtpResponse::new(221, "2.0.0 Bye"),
            starttls: None,
            timeout_on_command: None,
        }
    }
}

/// Where a conversation over one transport ended.
enum Conversation<S> {
    Closed,
    /// The client asked for STARTTLS and was told to go ahead.
    Upgrade(S),
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<RwLock<usize>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command received so far, across all connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Number of connections accepted so far
    pub async fn connections(&self) -> usize {
        *self.connections.read().await
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Some(greeting) = &config.greeting else {
            // Accept, then say nothing until the client gives up
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        };

        stream.write_all(&greeting.to_bytes()).await?;
        stream.flush().await?;

        let mut handled = 0;
        let Conversation::Upgrade(stream) =
            Self::converse(stream, &config, &commands, &mut handled).await?
        else {
            return Ok(());
        };

        let Some(acceptor) = &config.starttls else {
            return Ok(());
        };
        let tls_stream = acceptor.accept(stream).await?;
        Self::converse(tls_stream, &config, &commands, &mut handled).await?;

        Ok(())
    }

    /// Answers commands on one transport until the client leaves or asks to
    /// upgrade it.
    async fn converse<S>(
        stream: S,
        config: &MockServerConfig,
        commands: &RwLock<Vec<SmtpCommand>>,
        handled: &mut usize,
    ) -> Result<Conversation<S>, Box<dyn std::error::Error + Send + Sync>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();

            // Check if we should hang on this command
            if let Some(timeout_on) = config.timeout_on_command
                && *handled == timeout_on
            {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(Conversation::Closed);
            }

            let Ok(read_result) =
                timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(Conversation::Closed);
            };

            if read_result? == 0 {
                return Ok(Conversation::Closed);
            }
            *handled += 1;

            let cmd_line = line.trim_end();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    config.ehlo_response.to_bytes(),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument.to_string()),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    reader
                        .get_mut()
                        .write_all(&config.quit_response.to_bytes())
                        .await?;
                    reader.get_mut().flush().await?;
                    return Ok(Conversation::Closed);
                }
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    if config.starttls.is_some() {
                        reader.get_mut().write_all(b"220 2.0.0 Ready to start TLS\r\n").await?;
                        reader.get_mut().flush().await?;
                        return Ok(Conversation::Upgrade(reader.into_inner()));
                    }
                    (
                        SmtpResponse::new(502, "Command not implemented").to_bytes(),
                        SmtpCommand::StartTls,
                    )
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            if !matches!(smtp_cmd, SmtpCommand::StartTls) {
                commands.write().await.push(smtp_cmd.clone());
            }

            reader.get_mut().write_all(&response).await?;
            reader.get_mut().flush().await?;

            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(Conversation::Closed);
                    }

                    if data_line == ".\r\n" {
                        break;
                    }
                    message_content.extend_from_slice(data_line.as_bytes());
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(message_content));
                reader
                    .get_mut()
                    .write_all(&config.data_end_response.to_bytes())
                    .await?;
                reader.get_mut().flush().await?;
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = Some(SmtpResponse::new(code, message));
        self
    }

    /// Accept connections but never send a greeting
    #[must_use]
    pub fn without_greeting(mut self) -> Self {
        self.config.greeting = None;
        self
    }

    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_response = EhloResponse { code, capabilities };
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_quit_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.quit_response = SmtpResponse::new(code, message);
        self
    }

    /// Accept STARTTLS using the fixture certificate for `localhost` and
    /// `127.0.0.1`
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.config.starttls = Some(fixture_acceptor());
        self
    }

    /// Hang on the Nth command (0-indexed, counted across a TLS upgrade)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(RwLock::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let connections_clone = Arc::clone(&connections);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    *connections_clone.write().await += 1;
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            eprintln!("Mock server client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            connections,
            shutdown,
        })
    }
}

/// Path of a PEM fixture shipped with the tests
#[must_use]
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[allow(clippy::unwrap_used)]
fn fixture_acceptor() -> TlsAcceptor {
    let certs = rustls_pemfile::certs(&mut StdBufReader::new(
        File::open(fixture("server.pem")).unwrap(),
    ))
    .collect::<Result<Vec<_>, _>>()
    .unwrap();
    let key = rustls_pemfile::private_key(&mut StdBufReader::new(
        File::open(fixture("server.key")).unwrap(),
    ))
    .unwrap()
    .unwrap();

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}
