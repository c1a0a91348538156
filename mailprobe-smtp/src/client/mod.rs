//! Wire level SMTP client used by the session driver.
//!
//! - [`Response`] parses single and multi-line replies
//! - [`SmtpClient`] writes commands, reads replies and performs the STARTTLS
//!   upgrade, with every I/O call bounded by one session deadline
//! - [`tls`] turns a [`TlsClientPolicy`](mailprobe_common::config::TlsClientPolicy)
//!   into a rustls client configuration

mod connection;
mod response;
mod smtp_client;
pub mod tls;

pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
