// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Helper functions for establishing TCP and TLS connections to a broker.

use super::{TcpTransport, TlsTransport, TransportError, TransportOps};
use crate::mqtt_cl::server_uri::ServerUri;
use crate::mqtt_cl::ssl_options::SslOptions;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_rustls::{TlsConnector, client::TlsStream};

/// Opens a TCP connection to `host:port`.
///
/// Host names are resolved, IPv4 and IPv6 literals are accepted.
///
/// # Errors
///
/// [`TransportError::Timeout`] if `timeout` elapses, [`TransportError::Connect`]
/// if no resolved address accepted the connection.
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TcpStream, TransportError> {
    let connect = TcpStream::connect((host, port));
    let result = match timeout {
        Some(timeout_duration) => tokio::time::timeout(timeout_duration, connect)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => connect.await,
    };
    result.map_err(|e| TransportError::Connect(format!("{host}:{port}: {e}")))
}

/// Opens a TCP connection and performs the TLS handshake over it.
///
/// `domain` is used for SNI and for certificate host name verification.
pub async fn connect_tcp_tls(
    host: &str,
    port: u16,
    domain: &str,
    tls_config: Arc<ClientConfig>,
    timeout: Option<Duration>,
) -> Result<TlsStream<TcpStream>, TransportError> {
    let tcp_stream = connect_tcp(host, port, timeout).await?;

    let server_name = ServerName::try_from(domain.to_string())
        .map_err(|e| TransportError::Tls(Box::new(e)))?;
    let connector = TlsConnector::from(tls_config);
    let handshake = connector.connect(server_name, tcp_stream);

    let result = match timeout {
        Some(timeout_duration) => tokio::time::timeout(timeout_duration, handshake)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => handshake.await,
    };
    result.map_err(classify_handshake_error)
}

/// Builds a rustls client configuration from `ssl`.
///
/// - trust store given: only its CA certificates are trusted
/// - no trust store: the platform root certificates are trusted
/// - key store given: the client presents its certificate (mutual TLS)
/// - server certificate authentication disabled: any broker certificate is accepted
pub fn build_tls_config(ssl: &SslOptions) -> Result<Arc<ClientConfig>, TransportError> {
    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(Box::new(e)))?;

    let builder = if ssl.enable_server_cert_auth() {
        builder.with_root_certificates(root_store(ssl.trust_store().as_deref())?)
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
    };

    let mut config = match ssl.key_store() {
        Some(key_store) => {
            let chain = load_certs(key_store)?;
            let key_path = ssl.private_key().as_deref().unwrap_or(key_store);
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| TransportError::Certificate(Box::new(e)))?
        }
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = ssl
        .alpn_protocols()
        .iter()
        .map(|proto| proto.as_bytes().to_vec())
        .collect();

    Ok(Arc::new(config))
}

/// Opens the transport described by `uri`.
///
/// TLS URIs use `ssl` (or default TLS options when `None`). Failures during
/// TLS setup or the handshake are reported to the error handler of `ssl`
/// before being returned.
pub async fn connect_transport(
    uri: &ServerUri,
    ssl: Option<&SslOptions>,
    timeout: Option<Duration>,
) -> Result<Box<dyn TransportOps + Send>, TransportError> {
    if !uri.is_tls() {
        let stream = connect_tcp(uri.host(), uri.port(), timeout).await?;
        return Ok(Box::new(TcpTransport::from_stream(stream)));
    }

    let default_ssl = SslOptions::default();
    let ssl = ssl.unwrap_or(&default_ssl);
    let domain = ssl.server_name().as_deref().unwrap_or(uri.host());

    let result = match build_tls_config(ssl) {
        Ok(config) => connect_tcp_tls(uri.host(), uri.port(), domain, config, timeout).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(stream) => Ok(Box::new(TlsTransport::from_stream(stream))),
        Err(e) => {
            if matches!(e, TransportError::Tls(_) | TransportError::Certificate(_)) {
                ssl.report_error(&e.to_string());
            }
            Err(e)
        }
    }
}

fn root_store(trust_store: Option<&Path>) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    match trust_store {
        Some(path) => {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| TransportError::Certificate(Box::new(e)))?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for e in &native.errors {
                log_warn!("failed to load a platform certificate: {e}");
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            log_debug!("loaded {added} platform root certificates, ignored {ignored}");
        }
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Certificate(format!("cannot open {}: {e}", path.display()).into())
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::Certificate(format!("cannot parse {}: {e}", path.display()).into())
        })?;
    if certs.is_empty() {
        return Err(TransportError::Certificate(
            format!("no certificates found in {}", path.display()).into(),
        ));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Certificate(format!("cannot open {}: {e}", path.display()).into())
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| {
            TransportError::Certificate(format!("cannot parse {}: {e}", path.display()).into())
        })?
        .ok_or_else(|| {
            TransportError::Certificate(format!("no private key found in {}", path.display()).into())
        })
}

/// Maps a failed handshake to a certificate or a generic TLS error.
fn classify_handshake_error(e: std::io::Error) -> TransportError {
    let is_certificate = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls| {
            matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            )
        });
    if is_certificate {
        TransportError::Certificate(Box::new(e))
    } else {
        TransportError::Tls(Box::new(e))
    }
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
