//! TLS client policy used when a probe upgrades its connection with STARTTLS.
//!
//! This only describes *what* to trust; turning it into a rustls client
//! configuration happens in the SMTP crate, at upgrade time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the probe authenticates the server (and optionally itself) after
/// STARTTLS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsClientPolicy {
    /// Whether to skip certificate verification entirely.
    ///
    /// **SECURITY WARNING**: Setting this to `true` disables certificate
    /// validation. Only use it against servers with self-signed certificates.
    ///
    /// Default: `false`
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// PEM bundle of trust anchors. When unset, the platform's native roots
    /// are used.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate chain, for servers that require mutual TLS.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key matching `cert_file`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Name to present via SNI and to verify the certificate against.
    /// Defaults to the host part of the probe address.
    #[serde(default)]
    pub server_name: Option<String>,
}

impl TlsClientPolicy {
    /// A policy that verifies the server against the platform's trust store.
    #[must_use]
    pub const fn verified() -> Self {
        Self {
            insecure_skip_verify: false,
            ca_file: None,
            cert_file: None,
            key_file: None,
            server_name: None,
        }
    }

    /// A policy that accepts any server certificate.
    ///
    /// **WARNING**: Only use in test environments.
    #[must_use]
    pub const fn insecure() -> Self {
        Self {
            insecure_skip_verify: true,
            ca_file: None,
            cert_file: None,
            key_file: None,
            server_name: None,
        }
    }

    /// Trust only the anchors in the given PEM file.
    #[must_use]
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Present the given certificate chain and key to the server.
    #[must_use]
    pub fn with_client_identity(
        mut self,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    /// Override the name used for SNI and verification.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// The name to verify against, falling back to `host`.
    #[must_use]
    pub fn server_name_or<'a>(&'a self, host: &'a str) -> &'a str {
        self.server_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(host)
    }
}
