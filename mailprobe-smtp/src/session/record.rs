use core::fmt::{self, Display, Formatter};
use std::time::Duration;

use super::step::Operation;
use crate::error::ClientError;

/// How a probe session ended. Exactly one is assigned per session.
///
/// The discriminants are the stable `result_code` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Every attempted step matched its expected code, through QUIT.
    Success = 0,
    /// The connect timeout or the session deadline ran out.
    Timeout = 1,
    /// The TCP connection could not be established, or a write failed.
    ConnectionFailed = 2,
    /// The connection dropped or produced an unparsable reply.
    ReadFailed = 3,
    /// A well-formed reply carried an unexpected status code.
    StringMismatch = 4,
    /// STARTTLS was accepted but no TLS session could be set up with the
    /// configured trust policy.
    TlsConfigError = 5,
}

impl ResultKind {
    /// Tag value used in the output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::ConnectionFailed => "connection_failed",
            Self::ReadFailed => "read_failed",
            Self::StringMismatch => "string_mismatch",
            Self::TlsConfigError => "tls_config_error",
        }
    }

    /// Stable numeric encoding, `0` for success.
    #[must_use]
    pub const fn code(self) -> u64 {
        self as u64
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Maps a client error onto the result taxonomy.
    #[must_use]
    pub fn classify(error: &ClientError) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }

        match error {
            ClientError::Connect(_) | ClientError::Write(_) => Self::ConnectionFailed,
            ClientError::UnexpectedResponse { .. } => Self::StringMismatch,
            ClientError::TlsError(_) => Self::TlsConfigError,
            ClientError::Timeout => Self::Timeout,
            ClientError::Read(_)
            | ClientError::ConnectionClosed
            | ClientError::ParseError(_)
            | ClientError::Utf8Error(_) => Self::ReadFailed,
        }
    }
}

impl Display for ResultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single attempted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub operation: Operation,
    /// The status code the server sent, if a well-formed reply was observed.
    pub code: Option<u16>,
    pub outcome: ResultKind,
}

impl StepResult {
    #[must_use]
    pub const fn success(operation: Operation, code: u16) -> Self {
        Self {
            operation,
            code: Some(code),
            outcome: ResultKind::Success,
        }
    }

    #[must_use]
    pub fn failure(operation: Operation, error: &ClientError) -> Self {
        Self {
            operation,
            code: error.code(),
            outcome: ResultKind::classify(error),
        }
    }
}

/// Everything one probe session observed.
///
/// Populated by the driver over the life of one connection and handed out
/// once finished.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    steps: Vec<StepResult>,
    result: ResultKind,
    connect_time: Duration,
    total_time: Duration,
}

impl SessionRecord {
    pub(super) const fn new() -> Self {
        Self {
            steps: Vec::new(),
            result: ResultKind::Success,
            connect_time: Duration::ZERO,
            total_time: Duration::ZERO,
        }
    }

    pub(super) fn push(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    pub(super) const fn set_connect_time(&mut self, elapsed: Duration) {
        self.connect_time = elapsed;
    }

    pub(super) fn finish(mut self, result: ResultKind, total_time: Duration) -> Self {
        self.result = result;
        self.total_time = total_time.max(self.connect_time);
        self
    }

    /// Steps in the order they were attempted.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Status code observed for `operation`, if any.
    #[must_use]
    pub fn code(&self, operation: Operation) -> Option<u16> {
        self.steps
            .iter()
            .find(|step| step.operation == operation)
            .and_then(|step| step.code)
    }

    /// Every observed status code, in step order.
    pub fn codes(&self) -> impl Iterator<Item = (Operation, u16)> + '_ {
        self.steps
            .iter()
            .filter_map(|step| step.code.map(|code| (step.operation, code)))
    }

    #[must_use]
    pub const fn result(&self) -> ResultKind {
        self.result
    }

    #[must_use]
    pub const fn result_code(&self) -> u64 {
        self.result.code()
    }

    /// Time from dial start until the connect call returned.
    #[must_use]
    pub const fn connect_time(&self) -> Duration {
        self.connect_time
    }

    /// Time from dial start until the session ended.
    #[must_use]
    pub const fn total_time(&self) -> Duration {
        self.total_time
    }
}
