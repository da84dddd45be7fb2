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

use crate::mqtt_cl::callback::{Callback, CallbackSlot, Dispatcher};
use crate::mqtt_cl::connect_options::ConnectOptions;
use crate::mqtt_cl::connection::{self, SessionContext, Target};
use crate::mqtt_cl::connection_option::ConnectionOption;
use crate::mqtt_cl::error::MqttError;
use crate::mqtt_cl::message::Message;
use crate::mqtt_cl::packet::{Publish, Qos};
use crate::mqtt_cl::request::Request;
use crate::mqtt_cl::server_uri::ServerUri;
use crate::mqtt_cl::state::{ConnectionState, SharedState};
use crate::mqtt_cl::token::{Token, TokenKind};
use crate::mqtt_cl::token_registry::{SharedRegistry, TokenRegistry, lock_registry};
use crate::mqtt_cl::transport::TransportOps;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

/// Asynchronous MQTT v3.1.1 client.
///
/// Every operation returns immediately with a [`Token`] that completes when
/// the broker has answered. The network work happens on a session task
/// spawned onto the current tokio runtime by [`AsyncClient::connect`].
///
/// `AsyncClient` is `Send + Sync`; share it behind an `Arc` to publish from
/// several tasks.
///
/// # Examples
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::{AsyncClient, ConnectOptions, Message, Qos};
/// use std::time::Duration;
///
/// let client = AsyncClient::new("mqtt://localhost:1883", "sensor-1")?;
/// client.connect(ConnectOptions::default())?.wait().await?;
///
/// let msg = Message::new("sensors/temp", "21.5", Qos::AtLeastOnce, false)?;
/// client.publish(msg)?.wait_for(Duration::from_secs(10)).await?;
///
/// client.disconnect()?.wait().await?;
/// ```
pub struct AsyncClient {
    server_uri: ServerUri,
    client_id: String,
    connection_option: ConnectionOption,
    state: SharedState,
    registry: SharedRegistry,
    callback: CallbackSlot,
    requests: Mutex<Option<mpsc::UnboundedSender<Request>>>,
}

impl AsyncClient {
    /// Creates a client for `server_uri` with default engine settings.
    ///
    /// Nothing is opened until [`AsyncClient::connect`] is called.
    pub fn new(server_uri: &str, client_id: impl Into<String>) -> Result<Self, MqttError> {
        Self::with_options(server_uri, client_id, ConnectionOption::default())
    }

    pub fn with_options(
        server_uri: &str,
        client_id: impl Into<String>,
        connection_option: ConnectionOption,
    ) -> Result<Self, MqttError> {
        let server_uri: ServerUri = server_uri.parse()?;
        let client_id = client_id.into();
        if client_id.len() > usize::from(u16::MAX) {
            return Err(MqttError::InvalidOptions(
                "client id exceeds 65535 bytes".into(),
            ));
        }
        Ok(Self {
            server_uri,
            client_id,
            connection_option,
            state: SharedState::new(),
            registry: Arc::new(Mutex::new(TokenRegistry::new())),
            callback: CallbackSlot::default(),
            requests: Mutex::new(None),
        })
    }

    pub fn server_uri(&self) -> &ServerUri {
        &self.server_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Installs the observer for connection loss and delivery events,
    /// replacing any previous one.
    pub fn set_callback<C>(&self, callback: C)
    where
        C: Callback + 'static,
    {
        self.callback.set(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        self.callback.clear();
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Publish tokens still waiting for PUBACK, ordered by packet identifier.
    pub fn pending_delivery_tokens(&self) -> Vec<Token> {
        lock_registry(&self.registry).pending(TokenKind::Publish)
    }

    /// Opens a connection to the server URI and sends CONNECT.
    ///
    /// Allowed while disconnected or after a failure. The returned token
    /// completes on CONNACK; a refusal, a transport error or the connect
    /// timeout fails it and leaves the client in
    /// [`ConnectionState::Failed`].
    pub fn connect(&self, options: ConnectOptions) -> Result<Token, MqttError> {
        self.start(options, Target::Uri(self.server_uri.clone()))
    }

    /// Like [`AsyncClient::connect`], but runs the session over an already
    /// established transport instead of opening one from the server URI.
    pub fn attach<T>(&self, transport: T, options: ConnectOptions) -> Result<Token, MqttError>
    where
        T: TransportOps + Send + 'static,
    {
        self.start(options, Target::Transport(Box::new(transport)))
    }

    fn start(&self, options: ConnectOptions, target: Target) -> Result<Token, MqttError> {
        if self.client_id.is_empty() && !options.clean_session() {
            return Err(MqttError::InvalidOptions(
                "an empty client id requires a clean session".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MqttError::InvalidOptions(format!("no tokio runtime: {e}")))?;

        self.state.transition(ConnectionState::Connecting)?;
        let token = match lock_registry(&self.registry).register(TokenKind::Connect, None, None) {
            Ok(token) => token,
            Err(e) => {
                let _ = self.state.transition(ConnectionState::Failed);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock_requests() = Some(tx);

        let ctx = SessionContext {
            client_id: self.client_id.clone(),
            options,
            connection_option: self.connection_option.clone(),
            state: self.state.clone(),
            registry: self.registry.clone(),
            dispatcher: Dispatcher::spawn(self.callback.clone()),
            requests: rx,
        };
        log_debug!("starting session for '{}' to {}", self.client_id, self.server_uri);
        runtime.spawn(connection::run(ctx, target));
        Ok(token)
    }

    /// Queues `message` for delivery.
    ///
    /// QoS 0 tokens complete once the PUBLISH is written, QoS 1 tokens once
    /// the matching PUBACK arrives. QoS 2 is not supported.
    pub fn publish(&self, message: Message) -> Result<Token, MqttError> {
        if message.qos() == Qos::ExactlyOnce {
            return Err(MqttError::QosNotSupported(Qos::ExactlyOnce));
        }
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        let token = match message.qos() {
            Qos::AtMostOnce => Token::new(TokenKind::Publish, None, Some(message.clone())),
            _ => lock_registry(&self.registry).register(
                TokenKind::Publish,
                None,
                Some(message.clone()),
            )?,
        };
        let packet = Publish::from_message(&message, token.packet_id());
        self.submit(Request::Publish {
            token: token.clone(),
            packet,
        })?;
        Ok(token)
    }

    /// Sends DISCONNECT and closes the connection.
    ///
    /// Publish tokens still waiting for PUBACK fail with
    /// [`MqttError::Disconnected`]; the returned token completes once the
    /// transport is closed.
    pub fn disconnect(&self) -> Result<Token, MqttError> {
        self.state
            .transition(ConnectionState::Disconnecting)
            .map_err(|_| MqttError::NotConnected)?;
        let token = lock_registry(&self.registry).register(TokenKind::Disconnect, None, None)?;
        self.submit(Request::Disconnect {
            token: token.clone(),
        })?;
        Ok(token)
    }

    fn submit(&self, request: Request) -> Result<(), MqttError> {
        let sent = match &*self.lock_requests() {
            Some(tx) => tx.send(request).map_err(|e| e.0),
            None => Err(request),
        };
        let Err(request) = sent else {
            return Ok(());
        };

        let token = request.token();
        match token.packet_id() {
            Some(packet_id) => {
                lock_registry(&self.registry).resolve(
                    token.kind(),
                    Some(packet_id),
                    Err(MqttError::NotConnected),
                );
            }
            None => {
                token.complete(Err(MqttError::NotConnected));
            }
        }
        Err(MqttError::NotConnected)
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Request>>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("server_uri", &self.server_uri)
            .field("client_id", &self.client_id)
            .field("state", &self.state.get())
            .finish()
    }
}
