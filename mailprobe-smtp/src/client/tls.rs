//! Builds the rustls client configuration used for the STARTTLS upgrade.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use mailprobe_common::config::TlsClientPolicy;
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
};

use crate::error::TlsConfigError;

/// Builds a client configuration from the probe's TLS policy.
///
/// # Errors
///
/// Returns an error if a configured PEM file cannot be loaded, if the client
/// identity is incomplete, or if verification is enabled with no trust
/// anchors available.
pub fn client_config(policy: &TlsClientPolicy) -> Result<Arc<ClientConfig>, TlsConfigError> {
    let builder = ClientConfig::builder();

    let builder = if policy.insecure_skip_verify {
        tracing::warn!("SECURITY WARNING: TLS certificate validation is disabled for this probe");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
    } else {
        builder.with_root_certificates(root_store(policy)?)
    };

    let config = match (&policy.cert_file, &policy.key_file) {
        (Some(cert), Some(key)) => {
            builder.with_client_auth_cert(load_certificates(cert)?, load_private_key(key)?)?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => return Err(TlsConfigError::IncompleteIdentity),
    };

    Ok(Arc::new(config))
}

/// Resolves the name used for SNI and certificate verification.
///
/// # Errors
///
/// Returns `TlsConfigError::InvalidServerName` if the name is neither a DNS
/// name nor an IP address.
pub fn server_name(
    policy: &TlsClientPolicy,
    host: &str,
) -> Result<ServerName<'static>, TlsConfigError> {
    let name = policy.server_name_or(host);
    ServerName::try_from(name.to_string())
        .map_err(|_| TlsConfigError::InvalidServerName(name.to_string()))
}

fn root_store(policy: &TlsClientPolicy) -> Result<RootCertStore, TlsConfigError> {
    let mut root_store = RootCertStore::empty();

    if let Some(path) = policy.ca_file.as_deref() {
        let (added, ignored) = root_store.add_parsable_certificates(load_certificates(path)?);
        tracing::debug!(added, ignored, path = %path.display(), "Loaded trust anchors");
    } else {
        let certs = rustls_native_certs::load_native_certs();
        // Log errors but don't fail if some certs couldn't be loaded
        if !certs.errors.is_empty() {
            tracing::warn!(?certs.errors, "Some certificates could not be loaded");
        }
        root_store.add_parsable_certificates(certs.certs);
    }

    if root_store.is_empty() {
        return Err(TlsConfigError::NoTrustAnchors);
    }

    Ok(root_store)
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let file = File::open(path).map_err(|source| TlsConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificates {
            path: path.display().to_string(),
        });
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let file = File::open(path).map_err(|source| TlsConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsConfigError::KeyLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsConfigError::KeyLoad {
            path: path.display().to_string(),
            reason: "no private key found".to_string(),
        })
}

/// A certificate verifier that accepts all certificates.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
