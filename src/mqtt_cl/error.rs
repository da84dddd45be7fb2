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

use crate::mqtt_cl::packet::{CodecError, ConnectReturnCode, Qos};
use crate::mqtt_cl::state::ConnectionState;
use crate::mqtt_cl::transport::TransportError;
use thiserror::Error;

/// Unified error type for MQTT client operations.
///
/// Every failure of the client surfaces as one of these variants, either as
/// the `Err` of a call, as the outcome of a [`Token`](crate::mqtt_cl::Token),
/// or as the cause string handed to
/// [`Callback::connection_lost`](crate::mqtt_cl::Callback::connection_lost).
///
/// # Error Hierarchy
///
/// ```text
/// MqttError
/// ├── MalformedPacket         - codec rejected inbound or outbound bytes
/// ├── ProtocolViolation       - broker sent a packet out of sequence
/// ├── TlsHandshakeFailed      - TLS negotiation failed
/// ├── CertificateInvalid      - certificate material or verification failed
/// ├── ConnectionReset         - transport broke after being established
/// ├── ConnectFailed           - TCP connect failed
/// ├── ConnectTimeout          - no CONNACK within the connect timeout
/// ├── ConnectionRefused       - CONNACK carried a non-zero return code
/// ├── KeepAliveTimeout        - PINGRESP missing
/// ├── DeliveryFailed          - QoS 1 retransmissions exhausted
/// ├── Disconnected            - operation abandoned by disconnect
/// ├── Timeout                 - token wait timed out
/// └── state / option errors
/// ```
///
/// The type is `Clone` so that a single outcome can be observed by every
/// holder of a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    /// A packet could not be encoded or a received packet could not be decoded.
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] CodecError),

    /// The broker sent a packet that is not valid at this point of the session.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// TLS negotiation with the broker failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// Certificate material could not be loaded, or the peer certificate was rejected.
    #[error("certificate invalid: {0}")]
    CertificateInvalid(String),

    /// The transport failed or was closed by the peer.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The TCP connection could not be established.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection was not established within the connect timeout.
    #[error("connect timed out")]
    ConnectTimeout,

    /// The broker refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(ConnectReturnCode),

    /// The broker did not answer PINGREQ within the keep-alive interval.
    #[error("keep-alive timeout: no PINGRESP from broker")]
    KeepAliveTimeout,

    /// A QoS 1 publish was not acknowledged after all retransmissions.
    #[error("delivery of packet {packet_id} failed after {attempts} attempts")]
    DeliveryFailed { packet_id: u16, attempts: u32 },

    /// The operation was abandoned because the client disconnected.
    #[error("client disconnected")]
    Disconnected,

    /// Waiting on a token timed out. The token itself stays pending.
    #[error("timeout")]
    Timeout,

    /// The operation requires a connected client.
    #[error("client is not connected")]
    NotConnected,

    /// The operation is not valid in the current connection state.
    #[error("invalid state: {0}")]
    InvalidState(ConnectionState),

    #[error("{0} publishing is not supported")]
    QosNotSupported(Qos),

    #[error("packet identifier {0} is already in use")]
    PacketIdInUse(u16),

    #[error("no packet identifier available")]
    PacketIdExhausted,

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("invalid server URI: {0}")]
    InvalidServerUri(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Internal communication with the session task failed.
    #[error("channel closed")]
    ChannelClosed,
}

impl From<TransportError> for MqttError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io(err) => MqttError::ConnectionReset(err.to_string()),
            TransportError::Tls(err) => MqttError::TlsHandshakeFailed(err.to_string()),
            TransportError::Certificate(err) => MqttError::CertificateInvalid(err.to_string()),
            TransportError::Timeout => MqttError::ConnectTimeout,
            TransportError::Connect(msg) => MqttError::ConnectFailed(msg),
            TransportError::NotConnected => MqttError::NotConnected,
        }
    }
}
