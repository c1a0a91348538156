//! Configuration types shared between the session driver and the probe
//! entry point.

pub mod timeouts;
pub mod tls;

pub use timeouts::ProbeTimeouts;
pub use tls::TlsClientPolicy;
