//! Certificate loading (spec.md §6, SPEC_FULL.md §2: "TLS certificate
//! *acquisition* stays out of scope"). This only covers the two paths a
//! development relay needs: a cert/key pair from disk, or a self-signed
//! pair generated on the fly. Fetching a certificate from a real CA is left
//! to the deployer's own tooling, same as the teacher's `tls` module.

use std::{fs, io::Cursor, net::IpAddr, path::PathBuf, sync::Arc};

use clap::Parser;

#[derive(thiserror::Error, Debug)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("self-signed certificate generation failed: {0}")]
    SelfSigned(#[from] rcgen::Error),

    #[error("rustls configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

#[derive(Parser, Clone, Default)]
pub struct Args {
    /// Serve this certificate chain (PEM). If omitted, a self-signed
    /// certificate is generated for `--tls-hostname`.
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Private key matching `--cert` (PEM).
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Hostname(s) the self-signed certificate should cover, when `--cert`
    /// isn't provided.
    #[arg(long, default_value = "localhost")]
    pub tls_hostname: Vec<String>,

    /// Accept invalid (e.g. self-signed) server certificates on outbound
    /// connections. Development only.
    #[arg(long)]
    pub tls_insecure: bool,
}

pub struct Config {
    pub server: Option<rustls::ServerConfig>,
    pub client: rustls::ClientConfig,
    /// SHA-256 fingerprints of every certificate we're willing to serve,
    /// hex-encoded, for out-of-band pinning by a dev client.
    pub fingerprints: Vec<String>,
}

impl Args {
    pub fn load(&self) -> Result<Config, TlsError> {
        let (chain, key) = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => load_pem_pair(cert, key)?,
            _ => self_signed(&self.tls_hostname)?,
        };

        let fingerprints = chain.iter().map(fingerprint_hex).collect();

        let server = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key)?;

        let client = if self.tls_insecure {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth()
        } else {
            let mut roots = rustls::RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = roots.add(cert);
            }
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        Ok(Config {
            server: Some(server),
            client,
            fingerprints,
        })
    }
}

fn load_pem_pair(
    cert_path: &PathBuf,
    key_path: &PathBuf,
) -> Result<
    (
        Vec<rustls::pki_types::CertificateDer<'static>>,
        rustls::pki_types::PrivateKeyDer<'static>,
    ),
    TlsError,
> {
    let cert_bytes = fs::read(cert_path).map_err(|source| TlsError::Read {
        path: cert_path.clone(),
        source,
    })?;
    let key_bytes = fs::read(key_path).map_err(|source| TlsError::Read {
        path: key_path.clone(),
        source,
    })?;

    let chain: Vec<_> = rustls_pemfile::certs(&mut Cursor::new(cert_bytes))
        .collect::<Result<_, _>>()
        .map_err(|_| TlsError::NoCertificates(cert_path.clone()))?;
    if chain.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.clone()));
    }

    let key = rustls_pemfile::private_key(&mut Cursor::new(key_bytes))
        .map_err(|_| TlsError::NoPrivateKey(key_path.clone()))?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.clone()))?;

    Ok((chain, key))
}

fn self_signed(
    hostnames: &[String],
) -> Result<
    (
        Vec<rustls::pki_types::CertificateDer<'static>>,
        rustls::pki_types::PrivateKeyDer<'static>,
    ),
    TlsError,
> {
    let names = if hostnames.is_empty() {
        vec!["localhost".to_string()]
    } else {
        hostnames.to_vec()
    };

    let mut params = rcgen::CertificateParams::new(names.clone())?;
    for name in &names {
        if let Ok(ip) = name.parse::<IpAddr>() {
            params
                .subject_alt_names
                .push(rcgen::SanType::IpAddress(ip));
        }
    }

    let key_pair = rcgen::KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    log::warn!("no --cert/--key provided, serving a freshly generated self-signed certificate");

    Ok((
        vec![cert.der().clone()],
        rustls::pki_types::PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
    ))
}

fn fingerprint_hex(cert: &rustls::pki_types::CertificateDer<'_>) -> String {
    use ring::digest;
    let digest = digest::digest(&digest::SHA256, cert.as_ref());
    hex::encode(digest.as_ref())
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
