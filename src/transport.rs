//! Connection establishment: plain TCP or TLS with a configurable
//! certificate-verification policy.
//!
//! Each request gets its own [`Connection`]; nothing is pooled or reused.
//! The executor and the response parser only see the `AsyncRead`/
//! `AsyncWrite` surface, so both transports share the request/response
//! logic unchanged.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::errors::RequestError;

/// TLS protocol versions the handshake may negotiate. Older protocols
/// (SSLv2/3, TLS 1.0/1.1) are not expressible at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsVersions {
    pub tls12: bool,
    pub tls13: bool,
}

impl Default for TlsVersions {
    fn default() -> Self {
        Self {
            tls12: true,
            tls13: true,
        }
    }
}

impl TlsVersions {
    fn supported(self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        let mut versions = Vec::new();
        if self.tls12 {
            versions.push(&rustls::version::TLS12);
        }
        if self.tls13 {
            versions.push(&rustls::version::TLS13);
        }
        versions
    }
}

/// Certificate-verification policy for TLS connections. Read-only after
/// construction and shared by every request of a worker.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    /// When false, any certificate is accepted.
    pub verify_peer: bool,
    /// With `debug_verify`, accept a failed verification anyway. Always
    /// logged, never silent.
    pub override_on_failure: bool,
    /// Log every certificate in the presented chain while verifying.
    pub debug_verify: bool,
    pub allowed_versions: TlsVersions,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            verify_peer: true,
            override_on_failure: false,
            debug_verify: false,
            allowed_versions: TlsVersions::default(),
        }
    }
}

/// One connected byte stream, plain or encrypted.
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_write(cx, data),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Connection::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Opens a plain TCP connection to the pre-resolved endpoint, timing the
/// connect.
pub async fn connect_plain(addr: SocketAddr) -> Result<(Connection, Duration), RequestError> {
    let started = Instant::now();
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| RequestError::Connect { addr, source })?;
    Ok((Connection::Plain(stream), started.elapsed()))
}

/// Opens a TCP connection and performs a TLS handshake with SNI set to
/// `host`, timing both steps separately.
pub async fn connect_tls(
    addr: SocketAddr,
    host: &str,
    config: &Arc<ClientConfig>,
) -> Result<(Connection, Duration, Duration), RequestError> {
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
        RequestError::ServerName {
            host: host.to_string(),
        }
    })?;

    let started = Instant::now();
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|source| RequestError::Connect { addr, source })?;
    let connect = started.elapsed();

    let connector = TlsConnector::from(config.clone());
    let handshake_started = Instant::now();
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(RequestError::Handshake)?;
    let handshake = handshake_started.elapsed();

    Ok((Connection::Tls(Box::new(stream)), connect, handshake))
}

/// Builds the rustls client configuration for a policy. Built once per
/// worker; connections only clone the `Arc`.
pub fn client_config(policy: &TlsPolicy) -> Result<ClientConfig, RequestError> {
    let versions = policy.allowed_versions.supported();
    if versions.is_empty() {
        return Err(RequestError::TlsConfig(
            "no TLS protocol versions enabled".to_string(),
        ));
    }

    if !policy.verify_peer {
        warn!("TLS certificate verification is disabled; any certificate will be accepted");
        return Ok(ClientConfig::builder_with_protocol_versions(&versions)
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth());
    }

    let webpki = WebPkiServerVerifier::builder(Arc::new(native_roots()))
        .build()
        .map_err(|e| RequestError::TlsConfig(e.to_string()))?;

    let config = if policy.debug_verify {
        ClientConfig::builder_with_protocol_versions(&versions)
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DebugChainVerifier {
                inner: webpki,
                override_on_failure: policy.override_on_failure,
            }))
            .with_no_client_auth()
    } else {
        ClientConfig::builder_with_protocol_versions(&versions)
            .with_webpki_verifier(webpki)
            .with_no_client_auth()
    };
    Ok(config)
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, skipped) = roots.add_parsable_certificates(certs);
            debug!(added, skipped, "loaded platform root certificates");
        }
        Err(e) => warn!(error = %e, "could not load platform root certificates"),
    }
    roots
}

const ALL_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::RSA_PKCS1_SHA1,
    SignatureScheme::ECDSA_SHA1_Legacy,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::ECDSA_NISTP521_SHA512,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PSS_SHA384,
    SignatureScheme::RSA_PSS_SHA512,
    SignatureScheme::ED25519,
    SignatureScheme::ED448,
];

/// Verifier used when peer verification is disabled.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ALL_SCHEMES.to_vec()
    }
}

/// Diagnostic verifier: logs every certificate in the presented chain and,
/// on a failed verification, either propagates the failure or accepts it
/// when the policy allows the override. The downgrade is always logged.
#[derive(Debug)]
struct DebugChainVerifier {
    inner: Arc<dyn ServerCertVerifier>,
    override_on_failure: bool,
}

impl ServerCertVerifier for DebugChainVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        info!(
            position = 0,
            der_bytes = end_entity.as_ref().len(),
            "verifying end-entity certificate"
        );
        for (index, cert) in intermediates.iter().enumerate() {
            info!(
                position = index + 1,
                der_bytes = cert.as_ref().len(),
                "chain certificate"
            );
        }

        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => {
                info!(server = ?server_name, "certificate verification successful");
                Ok(verified)
            }
            Err(error) if self.override_on_failure => {
                warn!(
                    server = ?server_name,
                    %error,
                    "certificate verification unsuccessful; overriding because of user settings"
                );
                Ok(ServerCertVerified::assertion())
            }
            Err(error) => {
                warn!(server = ?server_name, %error, "certificate verification unsuccessful");
                Err(error)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
