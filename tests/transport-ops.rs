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

use mqtt_client_tokio::mqtt_cl::packet::{
    self, Connack, ConnectReturnCode, Decoded, Packet, Puback,
};
use mqtt_client_tokio::mqtt_cl::transport::{TcpTransport, TlsTransport, TransportOps};
use mqtt_client_tokio::mqtt_cl::{AsyncClient, ConnectOptions, Message, Qos};

mod common;

use bytes::BytesMut;
use std::io::IoSlice;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;

/// Reads one packet from `transport`, keeping leftovers in `buf`.
async fn recv_packet<T: TransportOps>(transport: &mut T, buf: &mut BytesMut) -> Packet {
    loop {
        if let Decoded::Complete { packet, consumed } = packet::decode(buf).unwrap() {
            let _ = buf.split_to(consumed);
            return packet;
        }
        let mut chunk = [0u8; 256];
        let n = transport.recv(&mut chunk).await.unwrap();
        assert!(n > 0, "peer closed the connection");
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn send_packet<T: TransportOps>(transport: &mut T, packet: Packet) {
    let bytes = packet::encode(&packet).unwrap();
    transport.send(&[IoSlice::new(&bytes)]).await.unwrap();
}

async fn tcp_client_server_scenario() {
    common::init_tracing();

    // Create TCP listener
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    // Broker task
    let server_handle = tokio::spawn(async move {
        let (tcp_stream, _) = listener.accept().await.unwrap();
        let mut transport = TcpTransport::from_stream(tcp_stream);
        let mut buf = BytesMut::new();

        // Receive CONNECT packet
        match recv_packet(&mut transport, &mut buf).await {
            Packet::Connect(connect) => assert_eq!(connect.client_id, "test_client"),
            other => panic!("expected CONNECT, got {other:?}"),
        }

        // Send CONNACK packet
        send_packet(
            &mut transport,
            Packet::Connack(Connack {
                session_present: false,
                return_code: ConnectReturnCode::Accepted,
            }),
        )
        .await;

        // Receive PUBLISH packet and acknowledge it
        let packet_id = match recv_packet(&mut transport, &mut buf).await {
            Packet::Publish(publish) => publish.packet_id.unwrap(),
            other => panic!("expected PUBLISH, got {other:?}"),
        };
        send_packet(&mut transport, Packet::Puback(Puback { packet_id })).await;

        // Receive DISCONNECT packet
        assert_eq!(
            recv_packet(&mut transport, &mut buf).await,
            Packet::Disconnect
        );
        transport.shutdown(Duration::from_secs(1)).await;
    });

    let client = AsyncClient::new(&format!("mqtt://{server_addr}"), "test_client").unwrap();
    client
        .connect(ConnectOptions::default())
        .unwrap()
        .wait()
        .await
        .unwrap();

    let msg = Message::new("hello", "over tcp", Qos::AtLeastOnce, false).unwrap();
    client
        .publish(msg)
        .unwrap()
        .wait_for(Duration::from_secs(10))
        .await
        .unwrap();

    client.disconnect().unwrap().wait().await.unwrap();

    // Wait for server to complete
    server_handle.await.unwrap();
}

#[tokio::test]
async fn test_tcp_transport_client_server_v311() {
    tcp_client_server_scenario().await;
}

#[tokio::test]
async fn test_tcp_transport_from_stream() {
    common::init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let transport = TcpTransport::from_stream(stream);
        assert!(format!("{:?}", transport).contains("TcpTransport"));
    });

    let stream = TcpStream::connect(server_addr).await.unwrap();
    let transport = TcpTransport::from_stream(stream);
    assert!(format!("{:?}", transport).contains("TcpTransport"));
    assert_eq!(transport.stream().peer_addr().unwrap(), server_addr);

    server_handle.await.unwrap();
}

#[tokio::test]
async fn test_tls_transport_partial_writes() {
    common::init_tracing();

    // A tiny pipe forces write_vectored to make partial progress.
    let (client, mut peer) = tokio::io::duplex(7);
    let mut transport = TlsTransport::from_stream(client);
    assert!(format!("{:?}", transport).contains("TlsTransport"));

    let parts: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 13]).collect();
    let expected: Vec<u8> = parts.concat();

    let reader = tokio::spawn(async move {
        let mut received = vec![0u8; 65];
        peer.read_exact(&mut received).await.unwrap();
        received
    });

    let slices: Vec<IoSlice> = parts.iter().map(|p| IoSlice::new(p)).collect();
    transport.send(&slices).await.unwrap();
    assert_eq!(reader.await.unwrap(), expected);
}

#[tokio::test]
async fn test_boxed_transport_forwards_calls() {
    common::init_tracing();

    let (client, mut broker) = common::FakeBroker::pair();
    let mut boxed: Box<dyn TransportOps + Send> = Box::new(client);

    send_packet(&mut boxed, Packet::Pingreq).await;
    assert_eq!(broker.recv_packet().await, Packet::Pingreq);

    broker.send_packet(Packet::Pingresp).await;
    let mut buf = BytesMut::new();
    assert_eq!(recv_packet(&mut boxed, &mut buf).await, Packet::Pingresp);

    boxed.shutdown(Duration::from_millis(100)).await;
    broker.expect_closed().await;
}
