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
use getset::{CopyGetters, Getters};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Receives human readable descriptions of TLS failures.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&str) + Send + Sync>);

impl ErrorHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    pub fn call(&self, message: &str) {
        (self.0)(message)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(<fn>)")
    }
}

/// TLS settings for `mqtts://` and `ssl://` connections.
///
/// Paths are checked for existence when the options are built. The PEM
/// contents are parsed when a connection is opened, so a broken file is
/// reported through the connect token as
/// [`MqttError::CertificateInvalid`](crate::mqtt_cl::MqttError::CertificateInvalid).
///
/// # Usage
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::SslOptions;
///
/// let ssl = SslOptions::builder()
///     .trust_store("test-root-ca.crt")
///     .key_store("client.pem")
///     .error_handler(|msg| eprintln!("SSL Error: {msg}"))
///     .build()?;
/// ```
#[derive(Debug, Clone, Builder, Getters, CopyGetters)]
#[builder(
    derive(Debug),
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct SslOptions {
    /// PEM file with the CA certificates used to verify the broker
    ///
    /// # Default
    /// None (platform root certificates)
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    trust_store: Option<PathBuf>,

    /// PEM file with the client certificate chain, and its private key unless
    /// `private_key` is set
    ///
    /// # Default
    /// None (no client authentication)
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    key_store: Option<PathBuf>,

    /// PEM file with the client private key
    ///
    /// # Default
    /// None (key is read from `key_store`)
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    private_key: Option<PathBuf>,

    /// Verify the broker certificate chain and host name
    ///
    /// Disabling this accepts any certificate and should only be used for testing.
    ///
    /// # Default
    /// true
    #[builder(default = "true")]
    #[getset(get_copy = "pub")]
    enable_server_cert_auth: bool,

    /// Name used for SNI and certificate verification
    ///
    /// # Default
    /// None (host of the server URI)
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub")]
    server_name: Option<String>,

    /// ALPN protocol identifiers offered during the handshake
    ///
    /// # Default
    /// empty
    #[builder(default)]
    #[getset(get = "pub")]
    alpn_protocols: Vec<String>,

    /// Called with a description whenever TLS setup or the handshake fails
    ///
    /// # Default
    /// None
    #[builder(default, setter(custom))]
    #[getset(get = "pub")]
    error_handler: Option<ErrorHandler>,
}

impl SslOptions {
    pub fn builder() -> SslOptionsBuilder {
        SslOptionsBuilder::default()
    }

    /// Forwards `message` to the error handler, if one is configured.
    pub(crate) fn report_error(&self, message: &str) {
        if let Some(handler) = &self.error_handler {
            handler.call(message);
        }
    }
}

impl Default for SslOptions {
    fn default() -> Self {
        Self {
            trust_store: None,
            key_store: None,
            private_key: None,
            enable_server_cert_auth: true,
            server_name: None,
            alpn_protocols: Vec::new(),
            error_handler: None,
        }
    }
}

impl SslOptionsBuilder {
    /// Sets the callback that receives TLS error descriptions.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.error_handler = Some(Some(ErrorHandler::new(handler)));
        self
    }

    fn validate(&self) -> Result<(), String> {
        let files = [
            ("trust store", &self.trust_store),
            ("key store", &self.key_store),
            ("private key", &self.private_key),
        ];
        for (what, path) in files {
            if let Some(Some(path)) = path {
                if !path.exists() {
                    return Err(format!("{what} file not found: {}", path.display()));
                }
            }
        }
        if matches!(self.private_key, Some(Some(_))) && !matches!(self.key_store, Some(Some(_))) {
            return Err("private key requires a key store with the certificate chain".into());
        }
        Ok(())
    }
}
