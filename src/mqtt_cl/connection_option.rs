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

use derive_builder::Builder;
use getset::CopyGetters;
use tokio::time::Duration;

/// Engine tuning for a client session.
///
/// Unlike [`ConnectOptions`](crate::mqtt_cl::ConnectOptions), nothing here
/// is sent to the broker. These settings control how the session task
/// retransmits, reads and shuts down.
///
/// # Usage
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::ConnectionOption;
///
/// let option = ConnectionOption::builder()
///     .retry_interval_ms(2000u64)
///     .max_retry_count(5u32)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, CopyGetters)]
#[builder(
    derive(Debug),
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct ConnectionOption {
    /// Time to wait for PUBACK before a QoS 1 PUBLISH is resent with DUP set
    ///
    /// # Default
    /// 5000 (5 seconds)
    #[builder(default = "5000")]
    #[getset(get_copy = "pub")]
    retry_interval_ms: u64,

    /// Number of retransmissions before a QoS 1 publish fails
    ///
    /// The token fails with `DeliveryFailed` once the last retransmission
    /// also went unacknowledged for `retry_interval_ms`.
    ///
    /// # Default
    /// 3
    #[builder(default = "3")]
    #[getset(get_copy = "pub")]
    max_retry_count: u32,

    /// Connection shutdown timeout in milliseconds
    ///
    /// Maximum time to wait for graceful connection shutdown.
    /// After this timeout, the connection will be forcibly closed.
    ///
    /// # Default
    /// 5000 (5 seconds)
    #[builder(default = "5000")]
    #[getset(get_copy = "pub")]
    shutdown_timeout_ms: u64,

    /// Receive buffer size in bytes
    ///
    /// Size of the chunk read from the transport per call.
    ///
    /// # Default
    /// 4096
    #[builder(default = "4096")]
    #[getset(get_copy = "pub")]
    recv_buffer_size: usize,

    /// Largest inbound packet accepted, fixed header included
    ///
    /// A packet announcing a larger size closes the connection as malformed
    /// before its body is buffered.
    ///
    /// # Default
    /// 1048576 (1 MiB)
    #[builder(default = "1024 * 1024")]
    #[getset(get_copy = "pub")]
    max_packet_size: usize,
}

impl Default for ConnectionOption {
    fn default() -> Self {
        Self {
            retry_interval_ms: 5000,
            max_retry_count: 3,
            shutdown_timeout_ms: 5000,
            recv_buffer_size: 4096,
            max_packet_size: 1024 * 1024,
        }
    }
}

impl ConnectionOptionBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.recv_buffer_size == Some(0) {
            return Err("recv_buffer_size must be greater than zero".into());
        }
        if self.retry_interval_ms == Some(0) {
            return Err("retry_interval_ms must be greater than zero".into());
        }
        if matches!(self.max_packet_size, Some(size) if size < 2) {
            return Err("max_packet_size must be at least 2".into());
        }
        Ok(())
    }
}

impl ConnectionOption {
    pub fn builder() -> ConnectionOptionBuilder {
        ConnectionOptionBuilder::default()
    }

    pub(crate) fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
