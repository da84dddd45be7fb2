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

//! Transport layer for MQTT connections.
//!
//! The session task talks to the broker through the [`TransportOps`] trait.
//! Two implementations are provided:
//!
//! - **TCP**: [`TcpTransport`] for `mqtt://` URIs
//! - **TLS**: [`TlsTransport`] for `mqtts://` URIs
//!
//! [`connect_helper`] opens either of them from a
//! [`ServerUri`](crate::mqtt_cl::ServerUri) and builds the rustls
//! configuration from [`SslOptions`](crate::mqtt_cl::SslOptions).
//!
//! # Custom Transport Implementation
//!
//! Implement [`TransportOps`] and hand the value to
//! [`AsyncClient::attach`](crate::mqtt_cl::AsyncClient::attach) to run the
//! protocol over any other byte stream.

pub mod connect_helper;
mod tcp;
mod tls;

pub use tcp::TcpTransport;
pub use tls::{TlsStream, TlsTransport};

use futures_util::future::BoxFuture;
use std::io::IoSlice;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;

/// Error types that can occur during transport operations.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// TLS configuration or handshake failure.
    Tls(Box<dyn std::error::Error + Send + Sync>),
    /// Certificate material could not be loaded or the peer certificate was rejected.
    Certificate(Box<dyn std::error::Error + Send + Sync>),
    Timeout,
    Connect(String),
    NotConnected,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Tls(e) => write!(f, "TLS error: {e}"),
            TransportError::Certificate(e) => write!(f, "Certificate error: {e}"),
            TransportError::Timeout => write!(f, "Operation timed out"),
            TransportError::Connect(msg) => write!(f, "Connection failed: {msg}"),
            TransportError::NotConnected => write!(f, "Transport not connected"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Core trait that defines the transport layer operations for MQTT connections.
///
/// # Examples
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::transport::{TransportError, TransportOps};
/// use futures_util::future::BoxFuture;
/// use std::io::IoSlice;
/// use tokio::time::Duration;
///
/// struct MyCustomTransport {}
///
/// impl TransportOps for MyCustomTransport {
///     fn send<'a>(&'a mut self, buffers: &'a [IoSlice<'a>]) -> BoxFuture<'a, Result<(), TransportError>> {
///         Box::pin(async move { Ok(()) })
///     }
///
///     fn recv<'a>(&'a mut self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, TransportError>> {
///         Box::pin(async move { Ok(0) })
///     }
///
///     fn shutdown<'a>(&'a mut self, timeout: Duration) -> BoxFuture<'a, ()> {
///         Box::pin(async move {})
///     }
/// }
/// ```
pub trait TransportOps {
    /// Sends every byte of `buffers`, in order.
    ///
    /// Returns `Ok(())` only after all data has been written and flushed.
    /// A partial write is reported as an error, never as success.
    fn send<'a>(&'a mut self, buffers: &'a [IoSlice<'a>])
    -> BoxFuture<'a, Result<(), TransportError>>;

    /// Reads available bytes into `buffer`.
    ///
    /// Returns the number of bytes read. `Ok(0)` means the peer closed the
    /// connection in an orderly way.
    fn recv<'a>(&'a mut self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, TransportError>>;

    /// Gracefully shuts down the connection, forcing it closed once
    /// `timeout` expires.
    fn shutdown<'a>(&'a mut self, timeout: Duration) -> BoxFuture<'a, ()>;
}

impl TransportOps for Box<dyn TransportOps + Send> {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        (**self).send(buffers)
    }

    fn recv<'a>(&'a mut self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, TransportError>> {
        (**self).recv(buffer)
    }

    fn shutdown<'a>(&'a mut self, timeout: Duration) -> BoxFuture<'a, ()> {
        (**self).shutdown(timeout)
    }
}

/// Writes all of `buffers` with vectored writes, handling partial writes,
/// then flushes the stream.
pub(crate) async fn write_all_vectored<W>(
    stream: &mut W,
    buffers: &[IoSlice<'_>],
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_bytes: usize = buffers.iter().map(|buf| buf.len()).sum();

    let mut buffer_start_indices = vec![0usize; buffers.len()];
    let mut total_written = 0usize;

    while total_written < total_bytes {
        let current_buffers: Vec<IoSlice> = buffers
            .iter()
            .enumerate()
            .filter_map(|(i, buf)| {
                let start = buffer_start_indices[i];
                (start < buf.len()).then(|| IoSlice::new(&buf[start..]))
            })
            .collect();

        let bytes_written = stream
            .write_vectored(&current_buffers)
            .await
            .map_err(TransportError::Io)?;
        if bytes_written == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0 bytes written",
            )));
        }
        total_written += bytes_written;

        let mut remaining_to_skip = bytes_written;
        for (i, buf) in buffers.iter().enumerate() {
            let available = buf.len() - buffer_start_indices[i];
            if available > 0 {
                let to_consume = remaining_to_skip.min(available);
                buffer_start_indices[i] += to_consume;
                remaining_to_skip -= to_consume;
                if remaining_to_skip == 0 {
                    break;
                }
            }
        }
    }

    stream.flush().await.map_err(TransportError::Io)
}
