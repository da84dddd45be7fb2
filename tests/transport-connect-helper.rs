/**
 * MIT License
 *
 * Copyright (c) 2025 Takatoshi Kondo
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */
use bytes::BytesMut;
use mqtt_client_tokio::mqtt_cl::packet::{self, Connack, ConnectReturnCode, Decoded, Packet};
use mqtt_client_tokio::mqtt_cl::transport::{TransportError, TransportOps, connect_helper};
use mqtt_client_tokio::mqtt_cl::{
    AsyncClient, ConnectOptions, ConnectionState, MqttError, ServerResponse, ServerUri, SslOptions,
};
use rustls::pki_types::CertificateDer;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use std::fs::File;
use std::io::{BufReader, IoSlice, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, timeout};
use tokio_rustls::TlsAcceptor;

mod common;

/// Test TCP server that echoes what it receives once
async fn run_tcp_echo_server(shutdown_rx: oneshot::Receiver<()>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let actual_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown_rx = shutdown_rx;
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((mut stream, _)) => {
                            tokio::spawn(async move {
                                let mut buffer = [0; 1024];
                                if let Ok(n) = stream.read(&mut buffer).await {
                                    if n > 0 {
                                        let _ = stream.write_all(&buffer[..n]).await;
                                    }
                                }
                            });
                        }
                        Err(_) => break,
                    }
                }
                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }
    });

    actual_addr
}

/// Server that accepts TCP connections and drops them without speaking TLS
async fn run_dropping_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let actual_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    actual_addr
}

fn cert_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/certs")
        .join(name)
}

fn load_certs(name: &str) -> Vec<CertificateDer<'static>> {
    let mut reader = BufReader::new(File::open(cert_path(name)).unwrap());
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// TLS configuration for the test broker
///
/// The broker presents `server.crt.pem` and requires a client certificate
/// issued by `root-ca.crt.pem`.
fn load_tls_acceptor() -> TlsAcceptor {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut client_roots = RootCertStore::empty();
    for cert in load_certs("root-ca.crt.pem") {
        client_roots.add(cert).unwrap();
    }
    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(client_roots), provider.clone())
            .build()
            .unwrap();

    let mut key_reader = BufReader::new(File::open(cert_path("server.key.pem")).unwrap());
    let private_key = rustls_pemfile::private_key(&mut key_reader)
        .unwrap()
        .unwrap();

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(load_certs("server.crt.pem"), private_key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

/// What the TLS test broker saw from one client.
#[derive(Debug)]
struct TlsSession {
    client_certificates: usize,
    packets: Vec<Packet>,
}

/// Test broker that accepts one TLS connection, answers CONNECT with an
/// accepting CONNACK and records every packet until the client closes.
///
/// The receiver errors if the handshake did not complete.
async fn run_tls_test_broker() -> (SocketAddr, oneshot::Receiver<TlsSession>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let actual_addr = listener.local_addr().unwrap();
    let acceptor = load_tls_acceptor();
    let (session_tx, session_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut tls_stream) = acceptor.accept(stream).await else {
            return;
        };
        let client_certificates = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .map_or(0, |chain| chain.len());

        let mut packets = Vec::new();
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 1024];
        loop {
            match packet::decode(&buf) {
                Ok(Decoded::Complete { packet, consumed }) => {
                    let _ = buf.split_to(consumed);
                    if matches!(packet, Packet::Connect(_)) {
                        let connack = packet::encode(&Packet::Connack(Connack {
                            session_present: false,
                            return_code: ConnectReturnCode::Accepted,
                        }))
                        .unwrap();
                        if tls_stream.write_all(&connack).await.is_err() {
                            break;
                        }
                        let _ = tls_stream.flush().await;
                    }
                    packets.push(packet);
                    continue;
                }
                Ok(Decoded::Incomplete) => {}
                Err(_) => break,
            }
            match tls_stream.read(&mut chunk).await {
                Ok(n) if n > 0 => buf.extend_from_slice(&chunk[..n]),
                _ => break,
            }
        }

        let _ = session_tx.send(TlsSession {
            client_certificates,
            packets,
        });
    });

    (actual_addr, session_rx)
}

#[tokio::test]
async fn test_connect_tcp() {
    common::init_tracing();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let addr = run_tcp_echo_server(shutdown_rx).await;

    let stream = connect_helper::connect_tcp("127.0.0.1", addr.port(), Some(Duration::from_secs(5)))
        .await
        .unwrap();
    let mut transport = mqtt_client_tokio::mqtt_cl::transport::TcpTransport::from_stream(stream);
    assert!(transport.stream().nodelay().unwrap());

    transport
        .send(&[IoSlice::new(b"hello "), IoSlice::new(b"broker")])
        .await
        .unwrap();
    let mut received = Vec::new();
    let mut buffer = [0u8; 64];
    while received.len() < 12 {
        let n = transport.recv(&mut buffer).await.unwrap();
        assert!(n > 0, "echo server closed early");
        received.extend_from_slice(&buffer[..n]);
    }
    assert_eq!(received, b"hello broker");

    transport.shutdown(Duration::from_secs(1)).await;
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_connect_tcp_refused() {
    common::init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = connect_helper::connect_tcp("127.0.0.1", port, None).await;
    assert!(matches!(result, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn test_connect_transport_plain_uri() {
    common::init_tracing();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let addr = run_tcp_echo_server(shutdown_rx).await;
    let uri: ServerUri = format!("mqtt://127.0.0.1:{}", addr.port()).parse().unwrap();

    let mut transport = connect_helper::connect_transport(&uri, None, None)
        .await
        .unwrap();
    transport.send(&[IoSlice::new(b"ping")]).await.unwrap();
    let mut buffer = [0u8; 4];
    let n = transport.recv(&mut buffer).await.unwrap();
    assert_eq!(&buffer[..n], &b"ping"[..n]);
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_tls_handshake_failure_is_reported() {
    common::init_tracing();

    let addr = run_dropping_server().await;
    let reports = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = reports.clone();
    let ssl = SslOptions::builder()
        .enable_server_cert_auth(false)
        .error_handler(move |msg| sink.lock().unwrap().push(msg.to_string()))
        .build()
        .unwrap();
    let options = ConnectOptions::builder()
        .ssl(ssl)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let client = AsyncClient::new(&format!("mqtts://127.0.0.1:{}", addr.port()), "tls").unwrap();
    let token = client.connect(options).unwrap();
    let err = timeout(Duration::from_secs(10), token.wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(err, MqttError::TlsHandshakeFailed(_)),
        "unexpected error: {err:?}"
    );
    assert_eq!(
        client.state(),
        mqtt_client_tokio::mqtt_cl::ConnectionState::Failed
    );
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("TLS error"));
}

#[tokio::test]
async fn test_unparsable_trust_store_is_a_certificate_error() {
    common::init_tracing();

    let mut trust_store = tempfile::NamedTempFile::new().unwrap();
    writeln!(trust_store, "not a certificate").unwrap();

    let reported = Arc::new(Mutex::new(0usize));
    let counter = reported.clone();
    let ssl = SslOptions::builder()
        .trust_store(trust_store.path())
        .error_handler(move |_| *counter.lock().unwrap() += 1)
        .build()
        .unwrap();

    assert!(matches!(
        connect_helper::build_tls_config(&ssl),
        Err(TransportError::Certificate(_))
    ));

    // Nothing needs to listen: the configuration fails before connecting.
    let client = AsyncClient::new("mqtts://127.0.0.1:1", "tls").unwrap();
    let options = ConnectOptions::builder().ssl(ssl).build().unwrap();
    let err = timeout(Duration::from_secs(5), client.connect(options).unwrap().wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(
        matches!(err, MqttError::CertificateInvalid(_)),
        "unexpected error: {err:?}"
    );
    assert_eq!(*reported.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_build_tls_config_without_verification() {
    let ssl = SslOptions::builder()
        .enable_server_cert_auth(false)
        .alpn_protocols(vec!["mqtt".to_string()])
        .build()
        .unwrap();
    let config = connect_helper::build_tls_config(&ssl).unwrap();
    assert_eq!(config.alpn_protocols, vec![b"mqtt".to_vec()]);
}

#[tokio::test]
async fn test_mutual_tls_connect_and_disconnect() {
    common::init_tracing();

    let (addr, session) = run_tls_test_broker().await;
    let reports = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = reports.clone();
    let ssl = SslOptions::builder()
        .trust_store(cert_path("root-ca.crt.pem"))
        .key_store(cert_path("client.crt.pem"))
        .private_key(cert_path("client.key.pem"))
        .error_handler(move |msg| sink.lock().unwrap().push(msg.to_string()))
        .build()
        .unwrap();
    let options = ConnectOptions::builder()
        .ssl(ssl)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let client =
        AsyncClient::new(&format!("mqtts://127.0.0.1:{}", addr.port()), "tls-client").unwrap();
    let response = timeout(Duration::from_secs(10), client.connect(options).unwrap().wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        response,
        ServerResponse::Connect {
            session_present: false
        }
    );
    assert!(client.is_connected());

    let disconnect = client.disconnect().unwrap();
    assert_eq!(
        timeout(Duration::from_secs(10), disconnect.wait())
            .await
            .unwrap()
            .unwrap(),
        ServerResponse::Disconnect
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let session = timeout(Duration::from_secs(10), session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.client_certificates, 1);
    assert_eq!(session.packets.len(), 2);
    match &session.packets[0] {
        Packet::Connect(connect) => assert_eq!(connect.client_id, "tls-client"),
        other => panic!("expected CONNECT, got {other:?}"),
    }
    assert_eq!(session.packets[1], Packet::Disconnect);
    assert!(reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_untrusted_broker_certificate_is_rejected() {
    common::init_tracing();

    let (addr, session) = run_tls_test_broker().await;
    let reports = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = reports.clone();
    let ssl = SslOptions::builder()
        .trust_store(cert_path("other-ca.crt.pem"))
        .key_store(cert_path("client.crt.pem"))
        .private_key(cert_path("client.key.pem"))
        .error_handler(move |msg| sink.lock().unwrap().push(msg.to_string()))
        .build()
        .unwrap();
    let options = ConnectOptions::builder()
        .ssl(ssl)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let client =
        AsyncClient::new(&format!("mqtts://127.0.0.1:{}", addr.port()), "tls-client").unwrap();
    let err = timeout(Duration::from_secs(10), client.connect(options).unwrap().wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(
        matches!(err, MqttError::CertificateInvalid(_)),
        "unexpected error: {err:?}"
    );
    assert_eq!(client.state(), ConnectionState::Failed);
    assert_eq!(reports.lock().unwrap().len(), 1);

    // The broker never sees a completed handshake.
    assert!(
        timeout(Duration::from_secs(10), session)
            .await
            .unwrap()
            .is_err()
    );
}
