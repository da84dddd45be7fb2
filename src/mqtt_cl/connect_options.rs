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

use crate::mqtt_cl::message::Message;
use crate::mqtt_cl::ssl_options::SslOptions;
use bytes::Bytes;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use tokio::time::Duration;

/// Per-connection MQTT options sent in CONNECT.
///
/// # Usage
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::{ConnectOptions, Message, Qos};
///
/// let will = Message::new("events/disconnect", "Last will and testament.", Qos::AtLeastOnce, true)?;
/// let options = ConnectOptions::builder()
///     .user_name("testuser")
///     .password("testpassword")
///     .will(will)
///     .build()?;
/// ```
#[derive(Debug, Clone, Builder, Getters, CopyGetters)]
#[builder(
    derive(Debug),
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct ConnectOptions {
    /// Keep-alive interval
    ///
    /// A PINGREQ is sent when nothing was written for this long. Sent to the
    /// broker rounded up to whole seconds. Zero disables keep-alive.
    ///
    /// # Default
    /// 60 seconds
    #[builder(default = "Duration::from_secs(60)")]
    #[getset(get_copy = "pub")]
    keep_alive_interval: Duration,

    /// # Default
    /// true
    #[builder(default = "true")]
    #[getset(get_copy = "pub")]
    clean_session: bool,

    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    user_name: Option<String>,

    /// Requires `user_name`.
    ///
    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    password: Option<Bytes>,

    /// Last will and testament
    ///
    /// # Default
    /// None
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    will: Option<Message>,

    /// TLS settings, used for `mqtts://` and `ssl://` URIs
    ///
    /// # Default
    /// None (platform trust roots, no client certificate)
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    ssl: Option<SslOptions>,

    /// Maximum time from starting to connect until CONNACK
    ///
    /// # Default
    /// 30 seconds
    #[builder(default = "Duration::from_secs(30)")]
    #[getset(get_copy = "pub")]
    connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }

    /// Keep-alive value for the CONNECT packet, in whole seconds.
    pub(crate) fn keep_alive_secs(&self) -> u16 {
        let interval = self.keep_alive_interval;
        let secs = interval.as_secs() + u64::from(interval.subsec_nanos() > 0);
        u16::try_from(secs).unwrap_or(u16::MAX)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(60),
            clean_session: true,
            user_name: None,
            password: None,
            will: None,
            ssl: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        let has_user_name = matches!(self.user_name, Some(Some(_)));
        if matches!(self.password, Some(Some(_))) && !has_user_name {
            return Err("a password requires a user name".into());
        }
        if let Some(Some(name)) = &self.user_name {
            if name.len() > usize::from(u16::MAX) {
                return Err("user name exceeds 65535 bytes".into());
            }
        }
        if let Some(interval) = self.keep_alive_interval {
            if interval > Duration::from_secs(u64::from(u16::MAX)) {
                return Err("keep-alive interval exceeds 65535 seconds".into());
            }
        }
        if let Some(timeout) = self.connect_timeout {
            if timeout.is_zero() {
                return Err("connect timeout must be greater than zero".into());
            }
        }
        Ok(())
    }
}
