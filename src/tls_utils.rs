use crate::config::TlsConfig;
use crate::error::{CertificateError, ProxyError, ProxyResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, aws_lc_rs, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig as RustlsServerConfig,
    SignatureScheme,
};
use std::io::{BufReader, ErrorKind};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// ALPN protocols offered to clients, HTTP/2 preferred
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Process-wide crypto provider, falling back to aws-lc-rs when none was
/// installed (tests, embedding applications).
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(aws_lc_rs::default_provider()))
}

async fn read_pem(path: &str) -> Result<Vec<u8>, CertificateError> {
    fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => CertificateError::FileNotFound {
            path: path.to_string(),
        },
        _ => CertificateError::LoadFailed {
            path: path.to_string(),
            reason: e.to_string(),
        },
    })
}

/// Read every certificate of a PEM chain
pub async fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let bytes = read_pem(path).await?;
    let mut reader = BufReader::new(bytes.as_slice());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::LoadFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(CertificateError::NoCertificates {
            path: path.to_string(),
        });
    }
    Ok(certs)
}

/// Read the first private key (PKCS#8, PKCS#1 or SEC1) of a PEM file
pub async fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, CertificateError> {
    let bytes = read_pem(path).await?;
    let mut reader = BufReader::new(bytes.as_slice());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CertificateError::PrivateKey {
            path: path.to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| CertificateError::PrivateKey {
            path: path.to_string(),
            reason: "No private key found in key file".to_string(),
        })
}

/// Build the front-end TLS configuration from the certificate and key files.
/// Any failure here is fatal at startup.
pub async fn create_server_config(tls: &TlsConfig) -> ProxyResult<RustlsServerConfig> {
    let certs = load_certs(&tls.cert_file).await?;
    let key = load_private_key(&tls.key_file).await?;

    let mut config = RustlsServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Config(format!("Unsupported TLS protocol versions: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| CertificateError::PrivateKey {
            path: tls.key_file.clone(),
            reason: e.to_string(),
        })?;

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    debug!(
        "Loaded TLS certificate {} and key {}",
        tls.cert_file, tls.key_file
    );
    Ok(config)
}

/// Build the TLS configuration used toward backends.
///
/// With `skip_verify` the certificate chain and host name are not checked;
/// handshake signatures still are. Otherwise the platform trust store is used.
pub fn create_client_config(skip_verify: bool) -> ProxyResult<ClientConfig> {
    let provider = crypto_provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Config(format!("Unsupported TLS protocol versions: {}", e)))?;

    let config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(native_roots())
            .with_no_client_auth()
    };

    Ok(config)
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Failed to load a native root certificate: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!("Loaded {} native root certificates ({} ignored)", added, ignored);
    roots
}

/// Accepts any backend certificate chain
#[derive(Debug)]
pub struct NoCertificateVerification(Arc<CryptoProvider>);

impl NoCertificateVerification {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self(provider)
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
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
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
