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

//! Session task driving one connection from CONNECT to teardown.
//!
//! The task owns the transport. It is the only writer and reads continuously
//! inside a `tokio::select!` loop that also serves the request channel and
//! the connect, retransmit and keep-alive deadlines.

use crate::mqtt_cl::callback::Dispatcher;
use crate::mqtt_cl::connect_options::ConnectOptions;
use crate::mqtt_cl::connection_option::ConnectionOption;
use crate::mqtt_cl::error::MqttError;
use crate::mqtt_cl::packet::{
    self, CodecError, Connack, Connect, Decoded, Packet, Puback, Publish, Qos,
};
use crate::mqtt_cl::request::Request;
use crate::mqtt_cl::server_uri::ServerUri;
use crate::mqtt_cl::state::{ConnectionState, SharedState};
use crate::mqtt_cl::token::{ServerResponse, Token, TokenKind};
use crate::mqtt_cl::token_registry::{SharedRegistry, lock_registry};
use crate::mqtt_cl::transport::{TransportOps, connect_helper};
use bytes::{Buf, BytesMut};
use std::collections::BTreeMap;
use std::io::IoSlice;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep_until};

/// Deadline used when a configured duration does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Where the session gets its transport from.
pub(crate) enum Target {
    Uri(ServerUri),
    Transport(Box<dyn TransportOps + Send>),
}

/// Shared handles and settings a session runs with.
pub(crate) struct SessionContext {
    pub(crate) client_id: String,
    pub(crate) options: ConnectOptions,
    pub(crate) connection_option: ConnectionOption,
    pub(crate) state: SharedState,
    pub(crate) registry: SharedRegistry,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) requests: mpsc::UnboundedReceiver<Request>,
}

/// Why the session loop ended.
enum Exit {
    /// Every client handle was dropped.
    Closed,
    Disconnected(Token),
    /// Failed before CONNACK accepted the connection.
    ConnectFailed(MqttError),
    /// Failed after the connection was established.
    Lost(MqttError),
}

/// Unacknowledged QoS 1 PUBLISH.
struct Inflight {
    packet: Publish,
    attempts: u32,
    deadline: Instant,
}

struct Session {
    ctx: SessionContext,
    transport: Box<dyn TransportOps + Send>,
    chunk: Vec<u8>,
    read_buf: BytesMut,
    inflight: BTreeMap<u16, Inflight>,
    connected: bool,
    connect_deadline: Instant,
    keep_alive: Option<Duration>,
    last_write: Instant,
    ping_deadline: Option<Instant>,
}

/// Runs a session to completion.
pub(crate) async fn run(ctx: SessionContext, target: Target) {
    let connect_deadline = deadline_after(Instant::now(), ctx.options.connect_timeout());
    let transport = match target {
        Target::Transport(transport) => Ok(transport),
        Target::Uri(uri) => {
            log_debug!("opening transport to {uri}");
            let open = connect_helper::connect_transport(&uri, ctx.options.ssl().as_ref(), None);
            match tokio::time::timeout_at(connect_deadline, open).await {
                Ok(result) => result.map_err(MqttError::from),
                Err(_) => Err(MqttError::ConnectTimeout),
            }
        }
    };

    let transport = match transport {
        Ok(transport) => transport,
        Err(e) => {
            ctx.finish(Exit::ConnectFailed(e));
            return;
        }
    };

    let mut session = Session::new(ctx, transport, connect_deadline);
    let exit = session.drive().await;
    let shutdown_timeout = session.ctx.connection_option.shutdown_timeout();
    session.transport.shutdown(shutdown_timeout).await;
    session.ctx.finish(exit);
}

impl Session {
    fn new(
        ctx: SessionContext,
        transport: Box<dyn TransportOps + Send>,
        connect_deadline: Instant,
    ) -> Self {
        let keep_alive = Some(ctx.options.keep_alive_interval()).filter(|ka| !ka.is_zero());
        let chunk = vec![0u8; ctx.connection_option.recv_buffer_size()];
        Self {
            ctx,
            transport,
            read_buf: BytesMut::with_capacity(chunk.len()),
            chunk,
            inflight: BTreeMap::new(),
            connected: false,
            connect_deadline,
            keep_alive,
            last_write: Instant::now(),
            ping_deadline: None,
        }
    }

    async fn drive(&mut self) -> Exit {
        let connect = Packet::Connect(self.connect_packet());
        if let Err(e) = self.write(&connect).await {
            return Exit::ConnectFailed(e);
        }
        log_debug!("CONNECT sent for '{}'", self.ctx.client_id);

        loop {
            if let Err(exit) = self.step().await {
                return exit;
            }
        }
    }

    async fn step(&mut self) -> Result<(), Exit> {
        let timer = self.next_deadline();
        tokio::select! {
            request = self.ctx.requests.recv() => match request {
                Some(Request::Publish { token, packet }) => self.send_publish(token, packet).await,
                Some(Request::Disconnect { token }) => match self.write(&Packet::Disconnect).await {
                    Ok(()) => Err(Exit::Disconnected(token)),
                    Err(e) => {
                        log_warn!("failed to send DISCONNECT: {e}");
                        Err(self.lost(e))
                    }
                },
                None => Err(Exit::Closed),
            },
            received = self.transport.recv(&mut self.chunk) => match received {
                Ok(0) => Err(self.lost(MqttError::ConnectionReset(
                    "connection closed by broker".into(),
                ))),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&self.chunk[..n]);
                    self.process_inbound().await
                }
                Err(e) => Err(self.lost(e.into())),
            },
            _ = sleep_until(timer.unwrap_or_else(Instant::now)), if timer.is_some() => {
                self.on_timer().await
            }
        }
    }

    /// Earliest of the connect, keep-alive and retransmit deadlines.
    fn next_deadline(&self) -> Option<Instant> {
        let connect = (!self.connected).then_some(self.connect_deadline);
        let keep_alive = self
            .keep_alive
            .filter(|_| self.connected)
            .map(|ka| self.ping_deadline.unwrap_or(self.last_write + ka));
        connect
            .into_iter()
            .chain(keep_alive)
            .chain(self.inflight.values().map(|flight| flight.deadline))
            .min()
    }

    fn lost(&self, error: MqttError) -> Exit {
        if self.connected {
            Exit::Lost(error)
        } else {
            Exit::ConnectFailed(error)
        }
    }

    fn connect_packet(&self) -> Connect {
        let options = &self.ctx.options;
        Connect {
            client_id: self.ctx.client_id.clone(),
            keep_alive: options.keep_alive_secs(),
            clean_session: options.clean_session(),
            will: options.will().clone(),
            user_name: options.user_name().clone(),
            password: options.password().clone(),
        }
    }

    async fn write(&mut self, packet: &Packet) -> Result<(), MqttError> {
        let bytes = packet::encode(packet)?;
        self.send_bytes(&bytes).await
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), MqttError> {
        self.transport.send(&[IoSlice::new(bytes)]).await?;
        self.last_write = Instant::now();
        Ok(())
    }

    async fn process_inbound(&mut self) -> Result<(), Exit> {
        loop {
            if let Err(e) = self.check_packet_size() {
                return Err(self.lost(MqttError::MalformedPacket(e)));
            }
            let packet = match packet::decode(&self.read_buf) {
                Ok(Decoded::Complete { packet, consumed }) => {
                    self.read_buf.advance(consumed);
                    packet
                }
                Ok(Decoded::Incomplete) => return Ok(()),
                Err(e) => return Err(self.lost(MqttError::MalformedPacket(e))),
            };
            log_trace!("received {}", packet.packet_type());
            self.on_packet(packet).await?;
        }
    }

    fn check_packet_size(&self) -> Result<(), CodecError> {
        let limit = self.ctx.connection_option.max_packet_size();
        match packet::packet_size(&self.read_buf)? {
            Some(size) if size > limit => Err(CodecError::PacketExceedsLimit { size, limit }),
            _ => Ok(()),
        }
    }

    async fn on_packet(&mut self, packet: Packet) -> Result<(), Exit> {
        match packet {
            Packet::Connack(connack) if !self.connected => self.on_connack(connack),
            Packet::Puback(Puback { packet_id }) if self.connected => {
                self.on_puback(packet_id);
                Ok(())
            }
            Packet::Publish(publish) if self.connected => self.on_incoming_publish(publish).await,
            Packet::Pingresp if self.connected => {
                self.ping_deadline = None;
                Ok(())
            }
            other => Err(self.lost(MqttError::ProtocolViolation(format!(
                "unexpected {} from broker",
                other.packet_type()
            )))),
        }
    }

    fn on_connack(&mut self, connack: Connack) -> Result<(), Exit> {
        if !connack.return_code.is_accepted() {
            return Err(Exit::ConnectFailed(MqttError::ConnectionRefused(
                connack.return_code,
            )));
        }
        self.connected = true;
        if let Err(e) = self.ctx.state.transition(ConnectionState::Connected) {
            log_warn!("CONNACK received in unexpected state: {e}");
        }
        lock_registry(&self.ctx.registry).resolve(
            TokenKind::Connect,
            None,
            Ok(ServerResponse::Connect {
                session_present: connack.session_present,
            }),
        );
        log_info!("connected as '{}'", self.ctx.client_id);
        Ok(())
    }

    fn on_puback(&mut self, packet_id: u16) {
        self.inflight.remove(&packet_id);
        let resolved = lock_registry(&self.ctx.registry).resolve(
            TokenKind::Publish,
            Some(packet_id),
            Ok(ServerResponse::Publish {
                packet_id: Some(packet_id),
            }),
        );
        match resolved {
            Some(token) => self.ctx.dispatcher.delivery_complete(token),
            None => log_debug!("ignoring PUBACK for packet id {packet_id} with nothing pending"),
        }
    }

    async fn on_incoming_publish(&mut self, publish: Publish) -> Result<(), Exit> {
        match (publish.qos, publish.packet_id) {
            (Qos::AtLeastOnce, Some(packet_id)) => {
                let puback = Packet::Puback(Puback { packet_id });
                self.write(&puback).await.map_err(|e| self.lost(e))
            }
            (Qos::ExactlyOnce, _) => {
                log_warn!("ignoring QoS 2 PUBLISH on '{}'", publish.topic);
                Ok(())
            }
            _ => {
                log_debug!("ignoring PUBLISH on '{}'", publish.topic);
                Ok(())
            }
        }
    }

    async fn send_publish(&mut self, token: Token, publish: Publish) -> Result<(), Exit> {
        let bytes = match packet::encode(&Packet::Publish(publish.clone())) {
            Ok(bytes) => bytes,
            Err(e) => {
                log_warn!("cannot encode PUBLISH on '{}': {e}", publish.topic);
                self.fail_token(&token, MqttError::MalformedPacket(e));
                return Ok(());
            }
        };
        self.send_bytes(&bytes).await.map_err(|e| self.lost(e))?;

        match publish.packet_id {
            None => {
                if token.complete(Ok(ServerResponse::Publish { packet_id: None })) {
                    self.ctx.dispatcher.delivery_complete(token);
                }
            }
            Some(packet_id) => {
                let deadline =
                    deadline_after(Instant::now(), self.ctx.connection_option.retry_interval());
                self.inflight.insert(
                    packet_id,
                    Inflight {
                        packet: publish,
                        attempts: 1,
                        deadline,
                    },
                );
            }
        }
        Ok(())
    }

    fn fail_token(&self, token: &Token, error: MqttError) {
        match token.packet_id() {
            Some(packet_id) => {
                lock_registry(&self.ctx.registry).resolve(
                    token.kind(),
                    Some(packet_id),
                    Err(error),
                );
            }
            None => {
                token.complete(Err(error));
            }
        }
    }

    async fn on_timer(&mut self) -> Result<(), Exit> {
        let now = Instant::now();
        if !self.connected {
            if now >= self.connect_deadline {
                return Err(Exit::ConnectFailed(MqttError::ConnectTimeout));
            }
            return Ok(());
        }

        self.retransmit_due(now).await?;

        if let Some(keep_alive) = self.keep_alive {
            match self.ping_deadline {
                Some(deadline) if now >= deadline => {
                    return Err(Exit::Lost(MqttError::KeepAliveTimeout));
                }
                None if now >= self.last_write + keep_alive => {
                    self.write(&Packet::Pingreq).await.map_err(|e| self.lost(e))?;
                    self.ping_deadline = Some(now + keep_alive);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resends every QoS 1 PUBLISH whose acknowledgment is overdue, failing
    /// those that have used up their retransmissions.
    async fn retransmit_due(&mut self, now: Instant) -> Result<(), Exit> {
        let max_retry_count = self.ctx.connection_option.max_retry_count();
        let retry_interval = self.ctx.connection_option.retry_interval();
        let due: Vec<u16> = self
            .inflight
            .iter()
            .filter(|(_, flight)| flight.deadline <= now)
            .map(|(packet_id, _)| *packet_id)
            .collect();

        for packet_id in due {
            let Some(flight) = self.inflight.get_mut(&packet_id) else {
                continue;
            };
            if flight.attempts > max_retry_count {
                let attempts = flight.attempts;
                self.inflight.remove(&packet_id);
                log_warn!("no PUBACK for packet id {packet_id} after {attempts} attempts");
                lock_registry(&self.ctx.registry).resolve(
                    TokenKind::Publish,
                    Some(packet_id),
                    Err(MqttError::DeliveryFailed {
                        packet_id,
                        attempts,
                    }),
                );
                continue;
            }

            flight.attempts += 1;
            flight.deadline = deadline_after(now, retry_interval);
            flight.packet.dup = true;
            log_debug!(
                "retransmitting packet id {packet_id}, attempt {}",
                flight.attempts
            );
            let packet = Packet::Publish(flight.packet.clone());
            self.write(&packet).await.map_err(|e| self.lost(e))?;
        }
        Ok(())
    }
}

impl SessionContext {
    /// Settles state, tokens and notifications once the session has ended.
    fn finish(mut self, exit: Exit) {
        // Requests still queued will never be served.
        self.requests.close();
        let mut orphaned = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            orphaned.push(request);
        }

        // The state changes under the registry lock so that a new connect
        // cannot register its token before the old ones are failed.
        let mut registry = lock_registry(&self.registry);
        let mut lost_cause = None;
        let residual = match exit {
            Exit::Closed => {
                self.set_state(ConnectionState::Disconnected);
                log_debug!("client dropped, session closed");
                MqttError::Disconnected
            }
            Exit::Disconnected(token) => {
                self.set_state(ConnectionState::Disconnected);
                registry.fail_kind(TokenKind::Publish, &MqttError::Disconnected);
                registry.resolve(
                    TokenKind::Disconnect,
                    token.packet_id(),
                    Ok(ServerResponse::Disconnect),
                );
                log_info!("disconnected");
                MqttError::Disconnected
            }
            Exit::ConnectFailed(error) => {
                self.set_state(ConnectionState::Failed);
                log_warn!("connect failed: {error}");
                registry.resolve(TokenKind::Connect, None, Err(error.clone()));
                error
            }
            Exit::Lost(error) => {
                let previous = self.set_state(ConnectionState::Failed);
                let cause = error.to_string();
                log_warn!("connection lost: {cause}");
                // Reported only for a loss while connected.
                if previous == Some(ConnectionState::Connected) {
                    lost_cause = Some(cause.clone());
                }
                match error {
                    MqttError::ConnectionReset(_) => error,
                    _ => MqttError::ConnectionReset(cause),
                }
            }
        };
        registry.fail_all(&residual);
        drop(registry);

        for request in orphaned {
            request.token().complete(Err(residual.clone()));
        }
        if let Some(cause) = lost_cause {
            self.dispatcher.connection_lost(cause);
        }
    }

    /// Moves to `next`, returning the state it replaced.
    fn set_state(&self, next: ConnectionState) -> Option<ConnectionState> {
        match self.state.transition(next) {
            Ok(previous) => Some(previous),
            Err(e) => {
                log_debug!("state change to {next} skipped: {e}");
                None
            }
        }
    }
}

fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}
