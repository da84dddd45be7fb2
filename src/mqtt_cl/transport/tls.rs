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

use super::{TransportError, TransportOps, write_all_vectored};
use futures_util::future::BoxFuture;
use std::io::IoSlice;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Duration, timeout};

/// Trait representing a TLS stream that can be used for async I/O operations.
///
/// Automatically implemented for every `AsyncRead + AsyncWrite + Send + Unpin`
/// type, so any established stream can be wrapped.
pub trait TlsStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}

impl<T> TlsStream for T where T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}

/// TLS transport for `mqtts://` connections.
///
/// Accepts an already established stream through
/// [`TlsTransport::from_stream`], typically the result of
/// [`connect_helper::connect_tcp_tls`](super::connect_helper::connect_tcp_tls).
pub struct TlsTransport {
    stream: Box<dyn TlsStream>,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("stream", &"<tls stream>")
            .finish()
    }
}

impl TlsTransport {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: TlsStream + 'static,
    {
        Self {
            stream: Box::new(stream),
        }
    }
}

impl TransportOps for TlsTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(write_all_vectored(&mut self.stream, buffers))
    }

    fn recv<'a>(&'a mut self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, TransportError>> {
        Box::pin(async move { self.stream.read(buffer).await.map_err(TransportError::Io) })
    }

    fn shutdown<'a>(&'a mut self, timeout_duration: Duration) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            // Sends close_notify; the socket is closed on drop either way.
            match timeout(timeout_duration, self.stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_debug!("TLS shutdown failed: {e}"),
                Err(_) => log_debug!("TLS shutdown timed out"),
            }
        })
    }
}
