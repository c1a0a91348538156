use core::fmt::{self, Display, Formatter};

/// One command/response exchange of a probe session, in the order they are
/// attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Waiting for the server greeting.
    Connect,
    Ehlo,
    StartTls,
    MailFrom,
    RcptTo,
    Data,
    /// Message payload and end-of-data marker.
    Body,
    Quit,
}

impl Operation {
    pub const ALL: [Self; 8] = [
        Self::Connect,
        Self::Ehlo,
        Self::StartTls,
        Self::MailFrom,
        Self::RcptTo,
        Self::Data,
        Self::Body,
        Self::Quit,
    ];

    /// Stable name used in output field names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Ehlo => "ehlo",
            Self::StartTls => "starttls",
            Self::MailFrom => "from",
            Self::RcptTo => "to",
            Self::Data => "data",
            Self::Body => "body",
            Self::Quit => "quit",
        }
    }

    /// Name of the output field carrying this step's status code.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Connect => "connect_code",
            Self::Ehlo => "ehlo_code",
            Self::StartTls => "starttls_code",
            Self::MailFrom => "from_code",
            Self::RcptTo => "to_code",
            Self::Data => "data_code",
            Self::Body => "body_code",
            Self::Quit => "quit_code",
        }
    }

    /// The reply code that counts as success for this step.
    #[must_use]
    pub const fn expected_code(self) -> u16 {
        match self {
            Self::Connect | Self::StartTls => 220,
            Self::Ehlo | Self::MailFrom | Self::RcptTo | Self::Body => 250,
            Self::Data => 354,
            Self::Quit => 221,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wraps an address in angle brackets unless it already has them.
pub(super) fn reverse_path(address: &str) -> String {
    let address = address.trim();
    if address.starts_with('<') && address.ends_with('>') {
        address.to_string()
    } else {
        format!("<{address}>")
    }
}
