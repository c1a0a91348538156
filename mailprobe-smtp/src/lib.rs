//! SMTP session driver for health-check probes.
//!
//! The [`client`] module holds the wire level pieces: a reply reader, a
//! command writer and the STARTTLS upgrade. The [`session`] module drives a
//! single scripted conversation over them and classifies how it ended.
//!
//! ```no_run
//! use mailprobe_smtp::session::{SessionConfig, SessionDriver};
//!
//! # async fn example() {
//! let config = SessionConfig::new("mx.example.com:25")
//!     .with_ehlo("probe.example.com")
//!     .with_from("probe@example.com")
//!     .with_to("postmaster@example.com");
//!
//! let record = SessionDriver::new(config).run().await;
//! println!("{} after {:?}", record.result(), record.total_time());
//! # }
//! ```

pub mod client;
pub mod error;
pub mod session;

pub use error::{ClientError, StepError, TlsConfigError};
pub use session::{
    Operation, ResultKind, SessionConfig, SessionDriver, SessionRecord, StepResult,
};
