//! Scripted probe sessions.
//!
//! A [`SessionDriver`] opens one connection, walks the configured steps in
//! a fixed order and stops at the first failure. Whatever happens, the
//! caller gets back a [`SessionRecord`] with one overall classification
//! and the timings; network problems never surface as errors.

mod record;
mod step;

use std::time::Duration;

use mailprobe_common::config::{ProbeTimeouts, TlsClientPolicy};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

pub use self::{
    record::{ResultKind, SessionRecord, StepResult},
    step::Operation,
};
use crate::{
    client::{SmtpClient, tls},
    error::{ClientError, StepError},
};

/// What a single probe session should do.
///
/// Empty strings and a `false` STARTTLS flag skip the matching step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// `host:port` to dial.
    pub address: String,
    pub timeouts: ProbeTimeouts,
    /// Identity sent with EHLO.
    pub ehlo: String,
    /// Envelope sender for MAIL FROM.
    pub from: String,
    /// Envelope recipient for RCPT TO.
    pub to: String,
    /// Message sent after DATA. Enables both the DATA and body steps.
    pub body: String,
    pub starttls: bool,
    pub tls: TlsClientPolicy,
}

impl SessionConfig {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ehlo(mut self, ehlo: impl Into<String>) -> Self {
        self.ehlo = ehlo.into();
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    #[must_use]
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsClientPolicy) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ProbeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Host part of the address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        let host = self
            .address
            .rsplit_once(':')
            .map_or(self.address.as_str(), |(host, _)| host);
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Whether `operation` takes part in this session.
    #[must_use]
    pub fn runs(&self, operation: Operation) -> bool {
        match operation {
            Operation::Connect | Operation::Quit => true,
            Operation::Ehlo => !self.ehlo.is_empty(),
            Operation::StartTls => self.starttls,
            Operation::MailFrom => !self.from.is_empty(),
            Operation::RcptTo => !self.to.is_empty(),
            Operation::Data | Operation::Body => !self.body.is_empty(),
        }
    }

    /// The steps this session attempts, in order.
    #[must_use]
    pub fn plan(&self) -> Vec<Operation> {
        Operation::ALL
            .into_iter()
            .filter(|operation| self.runs(*operation))
            .collect()
    }

    fn command(&self, operation: Operation) -> Option<String> {
        match operation {
            Operation::Connect | Operation::Body => None,
            Operation::Ehlo => Some(format!("EHLO {}", self.ehlo)),
            Operation::StartTls => Some("STARTTLS".to_string()),
            Operation::MailFrom => Some(format!("MAIL FROM:{}", step::reverse_path(&self.from))),
            Operation::RcptTo => Some(format!("RCPT TO:{}", step::reverse_path(&self.to))),
            Operation::Data => Some("DATA".to_string()),
            Operation::Quit => Some("QUIT".to_string()),
        }
    }
}

/// Runs probe sessions for one configuration.
#[derive(Debug, Clone)]
pub struct SessionDriver {
    config: SessionConfig,
}

impl SessionDriver {
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs one session against the configured server.
    ///
    /// Every failure is folded into the returned record. The connection is
    /// closed before this returns.
    #[tracing::instrument(name = "probe", skip_all, fields(address = %self.config.address))]
    pub async fn run(&self) -> SessionRecord {
        let started = Instant::now();
        let mut record = SessionRecord::new();

        let result = match self.session(started, &mut record).await {
            Ok(()) => ResultKind::Success,
            Err(err) => {
                let kind = err.kind();
                warn!(result = %kind, "Probe failed: {err}");
                if let StepError::Exchange { operation, source } = &err {
                    record.push(StepResult::failure(*operation, source));
                }
                kind
            }
        };

        let record = record.finish(result, started.elapsed());
        debug!(
            result = %record.result(),
            connect_time = ?record.connect_time(),
            total_time = ?record.total_time(),
            "Probe finished"
        );
        record
    }

    async fn session(&self, started: Instant, record: &mut SessionRecord) -> Result<(), StepError> {
        let dialed =
            SmtpClient::dial(&self.config.address, self.config.timeouts.connect_timeout()).await;
        record.set_connect_time(started.elapsed());

        let stream = dialed.map_err(|source| StepError::Exchange {
            operation: Operation::Connect,
            source,
        })?;
        let deadline = Instant::now() + self.config.timeouts.read_timeout();
        let mut client = SmtpClient::new(stream, deadline);

        let outcome = self.converse(&mut client, record).await;
        if outcome.as_ref().is_err_and(StepError::wants_quit) {
            quit_quietly(&mut client).await;
        }
        outcome
    }

    async fn converse(
        &self,
        client: &mut SmtpClient,
        record: &mut SessionRecord,
    ) -> Result<(), StepError> {
        for operation in self.config.plan() {
            let code = self
                .exchange(client, operation)
                .await
                .map_err(|source| StepError::Exchange { operation, source })?;

            debug!(%operation, code, "Step succeeded");
            record.push(StepResult::success(operation, code));

            if operation == Operation::StartTls {
                self.upgrade(client).await?;
            }
        }

        Ok(())
    }

    async fn exchange(
        &self,
        client: &mut SmtpClient,
        operation: Operation,
    ) -> Result<u16, ClientError> {
        if operation == Operation::Body {
            client.send_payload(&self.config.body).await?;
        } else if let Some(command) = self.config.command(operation) {
            client.send_command(&command).await?;
        }

        Ok(client.expect(operation.expected_code()).await?.code)
    }

    async fn upgrade(&self, client: &mut SmtpClient) -> Result<(), StepError> {
        let policy = &self.config.tls;
        let tls_config = tls::client_config(policy)?;
        let server_name = tls::server_name(policy, self.config.host())?;

        client
            .upgrade_to_tls(tls_config, server_name)
            .await
            .map_err(StepError::Handshake)?;

        debug!("Connection upgraded to TLS");
        Ok(())
    }
}

/// How long a failed session waits for the reply to its parting QUIT.
const QUIT_GRACE: Duration = Duration::from_millis(250);

/// Best-effort QUIT after a failed step. Nothing here affects the record, and
/// the reply is only waited on for [`QUIT_GRACE`].
async fn quit_quietly(client: &mut SmtpClient) {
    if let Err(err) = client.send_command("QUIT").await {
        debug!("Could not send QUIT after failure: {err}");
        return;
    }

    match timeout(QUIT_GRACE, client.read_response()).await {
        Ok(Ok(response)) => debug!(code = response.code, "Server answered QUIT after failure"),
        Ok(Err(err)) => debug!("No reply to QUIT after failure: {err}"),
        Err(_) => debug!("Gave up waiting for QUIT reply after {QUIT_GRACE:?}"),
    }
}
