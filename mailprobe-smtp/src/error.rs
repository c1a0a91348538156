//! Error types for the probe's SMTP client.
//!
//! [`ClientError`] describes what went wrong on the wire. It deliberately
//! keeps "a reply arrived, but with the wrong code" apart from "no usable
//! reply arrived", since only the former still yields a status code worth
//! reporting.

use std::io;

use thiserror::Error;

use crate::session::{Operation, ResultKind};

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("Failed to connect: {0}")]
    Connect(#[source] io::Error),

    /// Reading from the connection failed.
    #[error("Read error: {0}")]
    Read(#[source] io::Error),

    /// Writing to the connection failed.
    #[error("Write error: {0}")]
    Write(#[source] io::Error),

    /// The operation did not finish before its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Failed to parse an SMTP reply from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// The server replied with a status code other than the expected one.
    #[error("Unexpected SMTP status code: expected {expected}, got {code} - {message}")]
    UnexpectedResponse {
        expected: u16,
        code: u16,
        message: String,
    },

    /// The TLS handshake after STARTTLS failed.
    #[error("TLS error: {0}")]
    TlsError(String),
}

impl ClientError {
    /// The status code the server sent, if a well-formed reply was received.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedResponse { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure came from running out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Connect(err) | Self::Read(err) | Self::Write(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Errors raised while turning a TLS client policy into a rustls
/// configuration.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    /// A PEM file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A certificate file held no usable certificates.
    #[error("No certificates found in {path}")]
    NoCertificates { path: String },

    /// A private key file could not be parsed or held no key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// Only one half of a client identity was configured.
    #[error("Client certificate and key must be configured together")]
    IncompleteIdentity,

    /// Verification is on, but there is nothing to verify against.
    #[error("No trust anchors available for certificate verification")]
    NoTrustAnchors,

    /// The server name cannot be used for SNI or verification.
    #[error("Invalid server name '{0}'")]
    InvalidServerName(String),

    /// Rustls rejected the configuration.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsConfigError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// A failed session step, carrying enough context to classify the session.
#[derive(Debug, Error)]
pub enum StepError {
    /// A command/response exchange failed.
    #[error("{operation} step failed: {source}")]
    Exchange {
        operation: Operation,
        #[source]
        source: ClientError,
    },

    /// STARTTLS was accepted, but the policy could not be turned into a
    /// client configuration.
    #[error("Invalid TLS configuration: {0}")]
    TlsConfig(#[from] TlsConfigError),

    /// STARTTLS was accepted, but the handshake did not complete.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] ClientError),
}

impl StepError {
    /// The overall session classification this failure leads to.
    #[must_use]
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Exchange { source, .. } => ResultKind::classify(source),
            Self::TlsConfig(_) => ResultKind::TlsConfigError,
            Self::Handshake(source) if source.is_timeout() => ResultKind::Timeout,
            Self::Handshake(_) => ResultKind::TlsConfigError,
        }
    }

    /// Whether the session should still be closed with a QUIT.
    ///
    /// Once a TLS upgrade has been attempted the stream is no longer usable
    /// in plaintext, and a failing QUIT is not followed by another.
    #[must_use]
    pub fn wants_quit(&self) -> bool {
        match self {
            Self::Exchange { operation, .. } => *operation != Operation::Quit,
            Self::TlsConfig(_) | Self::Handshake(_) => false,
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
