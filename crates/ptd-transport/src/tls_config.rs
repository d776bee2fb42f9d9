//! TLS certificate material and rustls configuration.
//!
//! The `tls` server either loads a certificate/key pair given as options, or
//! uses a self-signed identity kept under `<statedir>/tls/` so restarts
//! present the same certificate.

use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ptd_core::defaults::{
    TLS_GENERATED_SAN, TLS_STATE_CERT_FILE, TLS_STATE_KEY_FILE, TLS_STATE_SUBDIR,
};
use rcgen::{CertificateParams, KeyPair, PKCS_ECDSA_P256_SHA256};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::info;

use crate::error::TransportError;

/// A certificate chain and its private key.
#[derive(Debug)]
pub struct TlsIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Load certificate and private key from PEM files.
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, TransportError> {
        let certs = read_certs(cert_path)?;
        let key = read_key(key_path)?;
        Ok(Self { certs, key })
    }

    /// Generate a self-signed ECDSA P-256 identity in memory.
    pub fn generate() -> Result<Self, TransportError> {
        let (cert_pem, key_pem) = generate_self_signed_pem()?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Load the identity persisted under `statedir`, creating it on first use.
    ///
    /// An empty `statedir` yields an ephemeral identity.
    pub fn load_or_generate(statedir: &Path) -> Result<Self, TransportError> {
        if statedir.as_os_str().is_empty() {
            return Self::generate();
        }

        let (cert_path, key_path) = state_paths(statedir);
        if cert_path.exists() && key_path.exists() {
            return Self::from_files(&cert_path, &key_path);
        }

        let (cert_pem, key_pem) = generate_self_signed_pem()?;
        if let Some(dir) = cert_path.parent() {
            fs::create_dir_all(dir)?;
        }
        write_private(&key_path, key_pem.as_bytes())?;
        fs::write(&cert_path, cert_pem.as_bytes())?;
        info!(path = %cert_path.display(), "generated tls transport certificate");
        Self::from_pem(&cert_pem, &key_pem)
    }

    fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, TransportError> {
        let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())?
            .ok_or_else(|| TransportError::CertGeneration("generated key missing".into()))?;
        Ok(Self { certs, key })
    }
}

/// Paths of the persisted certificate and key for `statedir`.
pub fn state_paths(statedir: &Path) -> (PathBuf, PathBuf) {
    let dir = statedir.join(TLS_STATE_SUBDIR);
    (dir.join(TLS_STATE_CERT_FILE), dir.join(TLS_STATE_KEY_FILE))
}

/// Build a rustls server config from an identity.
pub fn build_server_config(identity: TlsIdentity) -> Result<rustls::ServerConfig, TransportError> {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(identity.certs, identity.key)?;
    Ok(config)
}

/// Build a rustls client config.
///
/// `ca` replaces the webpki roots with the certificates in that PEM file;
/// `skip_verify` accepts any server certificate.
pub fn build_client_config(
    ca: Option<&Path>,
    skip_verify: bool,
) -> Result<rustls::ClientConfig, TransportError> {
    if skip_verify {
        return Ok(rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth());
    }

    let mut root_store = rustls::RootCertStore::empty();
    if let Some(ca_path) = ca {
        for cert in read_certs(ca_path)? {
            root_store
                .add(cert)
                .map_err(|e| TransportError::Config(format!("failed to add CA cert: {e}")))?;
        }
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

fn generate_self_signed_pem() -> Result<(String, String), TransportError> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| TransportError::CertGeneration(e.to_string()))?;
    let params = CertificateParams::new(vec![TLS_GENERATED_SAN.to_string()])
        .map_err(|e| TransportError::CertGeneration(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| TransportError::CertGeneration(e.to_string()))?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TransportError::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        TransportError::Config(format!("no private key found in {}", path.display()))
    })
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> Result<(), TransportError> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> Result<(), TransportError> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    Ok(())
}

/// A TLS certificate verifier that accepts any certificate.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|provider| {
                provider
                    .signature_verification_algorithms
                    .supported_schemes()
            })
            .unwrap_or_else(|| {
                rustls::crypto::aws_lc_rs::default_provider()
                    .signature_verification_algorithms
                    .supported_schemes()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_identity_without_statedir() {
        let identity = TlsIdentity::load_or_generate(Path::new("")).unwrap();
        assert_eq!(identity.certs.len(), 1);
    }

    #[test]
    fn test_identity_persisted_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first = TlsIdentity::load_or_generate(dir.path()).unwrap();

        let (cert_path, key_path) = state_paths(dir.path());
        assert!(cert_path.exists());
        assert!(key_path.exists());

        let second = TlsIdentity::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.certs, second.certs);
    }

    #[cfg(unix)]
    #[test]
    fn test_persisted_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        TlsIdentity::load_or_generate(dir.path()).unwrap();
        let (_, key_path) = state_paths(dir.path());
        let mode = fs::metadata(key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_from_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pem");
        assert!(matches!(
            TlsIdentity::from_files(&missing, &missing),
            Err(TransportError::Io(_))
        ));
    }

    #[test]
    fn test_from_files_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pem");
        fs::write(&empty, "").unwrap();
        assert!(matches!(
            TlsIdentity::from_files(&empty, &empty),
            Err(TransportError::Config(_))
        ));
    }
}
