//! Probe configuration and where it is loaded from.

use std::{
    io,
    path::{Path, PathBuf},
};

use mailprobe_common::config::{ProbeTimeouts, TlsClientPolicy};
use mailprobe_smtp::SessionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILPROBE_CONFIG";

/// Locations tried, in order, when neither a flag nor [`CONFIG_ENV`] names a
/// file.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./mailprobe.config.ron",
    "/etc/mailprobe/mailprobe.config.ron",
];

/// An annotated configuration, printed by `mailprobe --sample-config`.
pub const SAMPLE_CONFIG: &str = r#"(
    // Server address (host:port). An empty host means localhost.
    address: "localhost:25",

    // Connection timeout, in milliseconds
    // timeout_ms: 1000,

    // Deadline for the rest of the session once connected, in milliseconds
    // read_timeout_ms: 10000,

    // Optional value to provide to the EHLO command
    // ehlo: "example.com",

    // Optional value to provide to the MAIL FROM command
    // from: "me@example.com",

    // Optional value to provide to the RCPT TO command
    // to: "you@example.com",

    // Optional message sent after DATA
    // body: "this is a test payload",

    // Upgrade the connection with STARTTLS after EHLO
    // starttls: false,

    // tls: (
    //     insecure_skip_verify: false,
    //     ca_file: Some("/etc/ssl/certs/ca-certificates.crt"),
    //     cert_file: None,
    //     key_file: None,
    //     server_name: None,
    // ),
)
"#;

/// Configuration of one probe target.
///
/// Empty strings leave the matching SMTP step out of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// `host:port` of the server. Bracket IPv6 hosts, as in `[::1]:25`.
    #[serde(default)]
    pub address: String,

    /// Connection timeout in milliseconds.
    ///
    /// Default: 1000 (also used when set to 0)
    #[serde(default)]
    pub timeout_ms: u64,

    /// Deadline for the session after connecting, in milliseconds.
    ///
    /// Default: 10000 (also used when set to 0)
    #[serde(default)]
    pub read_timeout_ms: u64,

    #[serde(default)]
    pub ehlo: String,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub starttls: bool,

    #[serde(default)]
    pub tls: TlsClientPolicy,
}

impl ProbeConfig {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Effective timeouts, with unset values replaced by their defaults.
    #[must_use]
    pub fn timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            connect_ms: self.timeout_ms,
            read_ms: self.read_timeout_ms,
        }
        .resolved()
    }

    /// Session settings for dialing `address`.
    #[must_use]
    pub fn session(&self, address: String) -> SessionConfig {
        SessionConfig {
            address,
            timeouts: self.timeouts(),
            ehlo: self.ehlo.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            body: self.body.clone(),
            starttls: self.starttls,
            tls: self.tls.clone(),
        }
    }

    /// Parses a RON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is not a valid
    /// configuration.
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&content)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("MAILPROBE_CONFIG points to non-existent file: {}", .0.display())]
    MissingFromEnv(PathBuf),

    #[error("No configuration file found. Tried:\n  - MAILPROBE_CONFIG environment variable\n{tried}")]
    NotFound { tried: String },

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(String),
}

/// Finds the configuration file using the following precedence:
/// 1. `explicit`, usually from `--config`
/// 2. `from_env`, the value of [`CONFIG_ENV`]
/// 3. [`DEFAULT_CONFIG_PATHS`], in order
///
/// # Errors
///
/// Returns an error if an explicitly named file does not exist, or if no
/// candidate exists at all.
pub fn find_config_file(
    explicit: Option<&Path>,
    from_env: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::MissingFromEnv(path.to_path_buf()));
    }

    if let Some(path) = DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    let tried = DEFAULT_CONFIG_PATHS
        .iter()
        .map(|path| format!("  - {path}"))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound { tried })
}
