//! Test support utilities for probe session tests

pub mod mock_server;

pub use mock_server::{MockSmtpServer, SmtpCommand, fixture};
