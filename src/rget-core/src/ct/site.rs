//! Retrieve the certificate chain a site presents over TLS.
//!
//! The handshake deliberately trusts any chain: trust here comes from the
//! SCTs, not from a root store. The leaf must still name the host we dialed.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, instrument};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;

use super::leaf::{find_extension, parse_certificate};
use crate::error::RgetError;

const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";

/// What a site presented during the handshake.
#[derive(Debug, Clone)]
pub struct SiteChain {
    /// Host that was dialed.
    pub host: String,
    /// DER certificates, leaf first.
    pub chain: Vec<Vec<u8>>,
    /// SCTs from the TLS extension. rustls does not surface these, so
    /// this is empty for connections made here.
    pub tls_scts: Vec<Vec<u8>>,
}

/// Accepts any server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
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
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn tls_error(message: impl Into<String>) -> RgetError {
    RgetError::Tls {
        message: message.into(),
    }
}

fn connector() -> Result<TlsConnector, RgetError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(format!("TLS configuration: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Dial `url` (must be `https://`) and return the presented chain.
#[instrument(fields(url = %url))]
pub async fn fetch_site_chain(url: &str, deadline: Duration) -> Result<SiteChain, RgetError> {
    let parsed = Url::parse(url).map_err(|e| RgetError::parse(format!("failed to parse URL: {e}")))?;
    if parsed.scheme() != "https" {
        return Err(RgetError::parse("non-https URL provided"));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| RgetError::parse(format!("{url} has no host")))?
        .to_ascii_lowercase();
    let port = parsed.port_or_known_default().unwrap_or(443);

    let timed_out = |operation: &str| RgetError::Timeout {
        operation: format!("{operation} {host}:{port}"),
        seconds: deadline.as_secs(),
    };

    let tcp = timeout(deadline, TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| timed_out("TCP connect"))??;

    let server_name = ServerName::try_from(host.clone())
        .map_err(|e| tls_error(format!("invalid server name: {e}")))?;
    let tls = timeout(deadline, connector()?.connect(server_name, tcp))
        .await
        .map_err(|_| timed_out("TLS handshake"))?
        .map_err(|e| tls_error(format!("failed to dial {host}:{port}: {e}")))?;

    let chain: Vec<Vec<u8>> = tls
        .get_ref()
        .1
        .peer_certificates()
        .unwrap_or_default()
        .iter()
        .map(|c| c.as_ref().to_vec())
        .collect();
    debug!(certs = chain.len(), "Received peer chain");

    let leaf = chain
        .first()
        .ok_or_else(|| tls_error(format!("{host} presented no certificates")))?;
    if !certificate_covers_host(leaf, &host)? {
        return Err(tls_error(format!("cannot verify host for target: {host}")));
    }

    info!(host = %host, certs = chain.len(), "Fetched site chain");
    Ok(SiteChain {
        host,
        chain,
        tls_scts: Vec::new(),
    })
}

/// Whether a certificate's DNS SANs cover `host`.
///
/// Wildcards match exactly one leftmost label.
pub fn certificate_covers_host(cert_der: &[u8], host: &str) -> Result<bool, RgetError> {
    let cert = parse_certificate(cert_der)?;
    let Some(ext) = find_extension(&cert, OID_SUBJECT_ALT_NAME) else {
        return Ok(false);
    };
    let san = <SubjectAltName as der::Decode>::from_der(ext.extn_value.as_bytes())
        .map_err(|e| RgetError::parse(format!("subjectAltName: {e}")))?;

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    Ok(san.0.iter().any(|name| match name {
        GeneralName::DnsName(dns) => dns_name_matches(&dns.to_string(), &host),
        _ => false,
    }))
}

fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
        None => pattern == host,
    }
}
