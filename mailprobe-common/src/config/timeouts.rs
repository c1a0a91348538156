//! Timeout configuration for a probe session.
//!
//! A session is bounded by two budgets:
//! - **connect**: how long the TCP dial may take
//! - **read**: a single deadline, armed once the connection is up, that
//!   covers every later read, write and TLS handshake
//!
//! The read budget is *not* reset between steps, so a slow server can use it
//! up part way through the conversation.

use std::time::Duration;

/// Connect and read budgets, in milliseconds.
///
/// A value of `0` means "unset" and resolves to the default, so a configured
/// `0` never disables the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    /// Timeout for establishing the TCP connection.
    ///
    /// Default: 1000 ms
    pub connect_ms: u64,

    /// Deadline for the rest of the session, measured from connect.
    ///
    /// Default: 10000 ms
    pub read_ms: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: defaults::connect_ms(),
            read_ms: defaults::read_ms(),
        }
    }
}

impl ProbeTimeouts {
    /// Budgets too large for `u64` milliseconds saturate.
    #[must_use]
    pub fn new(connect: Duration, read: Duration) -> Self {
        Self {
            connect_ms: millis(connect),
            read_ms: millis(read),
        }
    }

    /// Effective connect timeout, with `0` falling back to the default.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        if self.connect_ms == 0 {
            Duration::from_millis(defaults::connect_ms())
        } else {
            Duration::from_millis(self.connect_ms)
        }
    }

    /// Effective read deadline budget, with `0` falling back to the default.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        if self.read_ms == 0 {
            Duration::from_millis(defaults::read_ms())
        } else {
            Duration::from_millis(self.read_ms)
        }
    }

    /// Returns a copy with every unset budget replaced by its default.
    #[must_use]
    pub fn resolved(self) -> Self {
        Self::new(self.connect_timeout(), self.read_timeout())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod defaults {
    pub const fn connect_ms() -> u64 {
        1_000
    }

    pub const fn read_ms() -> u64 {
        10_000
    }
}
