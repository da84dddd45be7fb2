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

#![allow(dead_code)]

use bytes::BytesMut;
use mqtt_client_tokio::mqtt_cl::packet::{
    self, Connack, Connect, ConnectReturnCode, Decoded, Packet,
};
use mqtt_client_tokio::mqtt_cl::transport::TlsTransport;
use mqtt_client_tokio::mqtt_cl::{
    AsyncClient, Callback, ConnectOptions, ConnectionOption, ConnectionState, Token,
};
use std::sync::Once;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

static INIT: Once = Once::new();

/// Automatic tracing initialization for ALL tests
///
/// Environment variables:
/// - `RUST_LOG`: Standard Rust logging (takes precedence if set)
/// - `MQTT_LOG_LEVEL`: Set log level (trace, debug, info, warn, error). Default: warn
///
/// Usage examples:
/// - `cargo test` (default warn level)
/// - `MQTT_LOG_LEVEL=trace cargo test`
/// - `RUST_LOG=debug cargo test`
fn auto_init_tracing() {
    INIT.call_once(|| {
        // Try RUST_LOG first, then MQTT_LOG_LEVEL, then default to warn
        let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
            tracing_subscriber::EnvFilter::new(rust_log)
        } else {
            let level = std::env::var("MQTT_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
            tracing_subscriber::EnvFilter::new(format!("mqtt_client_tokio={level}"))
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .init();
    });
}

pub fn init_tracing() {
    auto_init_tracing();
}

/// Upper bound for anything a test waits on.
pub const STEP: Duration = Duration::from_secs(5);

/// Broker side of an in-memory connection.
///
/// The client half is a [`TlsTransport`] over one end of a duplex pipe, so
/// the session runs exactly as it would over an established TLS stream.
pub struct FakeBroker {
    stream: DuplexStream,
    buf: BytesMut,
}

impl FakeBroker {
    pub fn pair() -> (TlsTransport, FakeBroker) {
        let (client, broker) = tokio::io::duplex(64 * 1024);
        (
            TlsTransport::from_stream(client),
            FakeBroker {
                stream: broker,
                buf: BytesMut::new(),
            },
        )
    }

    /// Next packet from the client, or `None` once the client closed the pipe.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        loop {
            match packet::decode(&self.buf).expect("client sent a malformed packet") {
                Decoded::Complete { packet, consumed } => {
                    let _ = self.buf.split_to(consumed);
                    return Some(packet);
                }
                Decoded::Incomplete => {}
            }
            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn recv_packet(&mut self) -> Packet {
        timeout(STEP, self.next_packet())
            .await
            .expect("timed out waiting for a packet")
            .expect("client closed the connection")
    }

    /// Waits up to `within` for a packet.
    pub async fn try_recv_packet(&mut self, within: Duration) -> Option<Packet> {
        timeout(within, self.next_packet()).await.ok().flatten()
    }

    pub async fn send_packet(&mut self, packet: Packet) {
        let bytes = packet::encode(&packet).unwrap();
        self.send_raw(&bytes).await;
    }

    /// Sends `packet` unless the client already closed the pipe.
    pub async fn try_send_packet(&mut self, packet: Packet) -> bool {
        let bytes = packet::encode(&packet).unwrap();
        self.stream.write_all(&bytes).await.is_ok() && self.stream.flush().await.is_ok()
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn expect_connect(&mut self) -> Connect {
        match self.recv_packet().await {
            Packet::Connect(connect) => connect,
            other => panic!("expected CONNECT, got {other:?}"),
        }
    }

    /// Reads CONNECT and answers with CONNACK carrying `return_code`.
    pub async fn answer_connect(&mut self, return_code: ConnectReturnCode) -> Connect {
        let connect = self.expect_connect().await;
        self.send_packet(Packet::Connack(Connack {
            session_present: false,
            return_code,
        }))
        .await;
        connect
    }

    /// Resolves once the client has closed its end of the pipe.
    pub async fn expect_closed(&mut self) {
        loop {
            match timeout(STEP, self.next_packet()).await {
                Ok(None) => return,
                Ok(Some(_)) => continue,
                Err(_) => panic!("client did not close the connection"),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Lost(String),
    Delivered(Option<u16>),
}

/// Callback forwarding every notification into a channel.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Callback for Recorder {
    fn connection_lost(&self, cause: &str) {
        let _ = self.tx.send(Event::Lost(cause.to_string()));
    }

    fn delivery_complete(&self, token: &Token) {
        let _ = self.tx.send(Event::Delivered(token.packet_id()));
    }
}

pub fn recorder() -> (Recorder, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder { tx }, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(STEP, rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("callback channel closed")
}

/// Short engine timings so retransmission tests finish quickly.
pub fn fast_option() -> ConnectionOption {
    ConnectionOption::builder()
        .retry_interval_ms(100u64)
        .max_retry_count(2u32)
        .shutdown_timeout_ms(200u64)
        .build()
        .unwrap()
}

/// Client attached to a fake broker that has already accepted the connection.
pub async fn connected_client(
    option: ConnectionOption,
    options: ConnectOptions,
) -> (AsyncClient, FakeBroker) {
    let client = AsyncClient::with_options("mqtt://localhost:1883", "test-client", option).unwrap();
    let (transport, mut broker) = FakeBroker::pair();
    let token = client.attach(transport, options).unwrap();
    broker.answer_connect(ConnectReturnCode::Accepted).await;
    timeout(STEP, token.wait()).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    (client, broker)
}
