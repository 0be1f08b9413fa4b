//! TLS and QUIC endpoint configuration
//!
//! Certificate validation is the default. The insecure mode (client skips server
//! verification, server uses an ephemeral self-signed certificate) exists for
//! bench testing and must be selected explicitly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{IdleTimeout, TransportConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::{DispatchError, Result};

/// ALPN protocol identifier both ends must agree on.
pub const ALPN: &[u8] = b"lidarcast/1";

/// How the sender authenticates the receiver.
#[derive(Debug, Clone)]
pub enum ClientTrust {
    /// Accept any server certificate. Bench testing only.
    Insecure,
    /// Trust certificates from a PEM file
    CaFile(PathBuf),
    /// Trust the given DER certificates
    Roots(Vec<CertificateDer<'static>>),
}

/// Certificate chain and key the receiver presents.
#[derive(Debug)]
pub enum ServerIdentity {
    /// PEM certificate chain and private key on disk
    PemFiles { cert: PathBuf, key: PathBuf },
    /// Certificate chain and key already in memory
    Der { chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static> },
}

impl ServerIdentity {
    /// Generate an ephemeral self-signed identity for the given names.
    pub fn self_signed(names: impl Into<Vec<String>>) -> Result<Self> {
        let certified = rcgen::generate_simple_self_signed(names).map_err(DispatchError::tls)?;
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
        Ok(ServerIdentity::Der { chain: vec![certified.cert.der().clone()], key: key.into() })
    }

    /// First certificate of the chain, e.g. to hand to a client as a trust root
    pub fn leaf(&self) -> Option<CertificateDer<'static>> {
        match self {
            ServerIdentity::Der { chain, .. } => chain.first().cloned(),
            ServerIdentity::PemFiles { cert, .. } => {
                CertificateDer::pem_file_iter(cert).ok()?.next()?.ok()
            }
        }
    }

    fn load(self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        match self {
            ServerIdentity::Der { chain, key } => Ok((chain, key)),
            ServerIdentity::PemFiles { cert, key } => {
                let chain = load_certificates(&cert)?;
                let key = PrivateKeyDer::from_pem_file(&key).map_err(|e| {
                    DispatchError::tls(format!("Failed to read key {}: {e}", key.display()))
                })?;
                Ok((chain, key))
            }
        }
    }
}

fn load_certificates(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>> {
    let chain = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| DispatchError::tls(format!("Failed to read certificates {}: {e}", path.display())))?;
    if chain.is_empty() {
        return Err(DispatchError::tls(format!("No certificates in {}", path.display())));
    }
    debug!(path = %path.display(), count = chain.len(), "Loaded certificates");
    Ok(chain)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Shared QUIC transport parameters.
pub fn transport_config(keep_alive: Option<Duration>, idle_timeout: Duration) -> Result<Arc<TransportConfig>> {
    let mut transport = TransportConfig::default();
    transport.keep_alive_interval(keep_alive);
    let idle = IdleTimeout::try_from(idle_timeout)
        .map_err(|_| DispatchError::config(format!("Idle timeout {idle_timeout:?} is out of range")))?;
    transport.max_idle_timeout(Some(idle));
    Ok(Arc::new(transport))
}

/// Build the sender's QUIC client configuration.
pub fn client_config(trust: &ClientTrust, transport: Arc<TransportConfig>) -> Result<quinn::ClientConfig> {
    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(DispatchError::tls)?;

    let mut crypto = match trust {
        ClientTrust::Insecure => {
            warn!("Server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
                .with_no_client_auth()
        }
        ClientTrust::CaFile(path) => {
            builder.with_root_certificates(root_store(load_certificates(path)?)?).with_no_client_auth()
        }
        ClientTrust::Roots(certs) => {
            builder.with_root_certificates(root_store(certs.clone())?).with_no_client_auth()
        }
    };
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic = QuicClientConfig::try_from(crypto).map_err(DispatchError::tls)?;
    let mut config = quinn::ClientConfig::new(Arc::new(quic));
    config.transport_config(transport);
    Ok(config)
}

fn root_store(certs: Vec<CertificateDer<'static>>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert).map_err(DispatchError::tls)?;
    }
    Ok(roots)
}

/// Build the receiver's QUIC server configuration.
pub fn server_config(identity: ServerIdentity, transport: Arc<TransportConfig>) -> Result<quinn::ServerConfig> {
    let (chain, key) = identity.load()?;
    let mut crypto = rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(DispatchError::tls)?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(DispatchError::tls)?;
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic = QuicServerConfig::try_from(crypto).map_err(DispatchError::tls)?;
    let mut config = quinn::ServerConfig::with_crypto(Arc::new(quic));
    config.transport_config(transport);
    Ok(config)
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_identity_builds_server_config() {
        let identity = ServerIdentity::self_signed(vec!["localhost".to_string()]).unwrap();
        assert!(identity.leaf().is_some());
        let transport = transport_config(Some(Duration::from_secs(1)), Duration::from_secs(600)).unwrap();
        server_config(identity, transport).unwrap();
    }

    #[test]
    fn client_configs_build_for_each_trust_mode() {
        let transport = transport_config(None, Duration::from_secs(10)).unwrap();
        client_config(&ClientTrust::Insecure, transport.clone()).unwrap();

        let identity = ServerIdentity::self_signed(vec!["localhost".to_string()]).unwrap();
        let roots = ClientTrust::Roots(vec![identity.leaf().unwrap()]);
        client_config(&roots, transport).unwrap();
    }

    #[test]
    fn pem_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        let identity = ServerIdentity::PemFiles { cert: cert_path.clone(), key: key_path };
        assert_eq!(identity.leaf().as_deref(), Some(certified.cert.der().as_ref()));

        let transport = transport_config(None, Duration::from_secs(10)).unwrap();
        server_config(identity, transport.clone()).unwrap();
        client_config(&ClientTrust::CaFile(cert_path), transport).unwrap();
    }

    #[test]
    fn missing_files_are_tls_errors() {
        let transport = transport_config(None, Duration::from_secs(10)).unwrap();
        let identity = ServerIdentity::PemFiles {
            cert: PathBuf::from("/nonexistent/cert.pem"),
            key: PathBuf::from("/nonexistent/key.pem"),
        };
        let err = server_config(identity, transport.clone()).unwrap_err();
        assert!(matches!(err, DispatchError::Tls { .. }));
        assert!(err.is_fatal());

        let err = client_config(&ClientTrust::CaFile("/nonexistent/ca.pem".into()), transport).unwrap_err();
        assert!(matches!(err, DispatchError::Tls { .. }));
    }
}
