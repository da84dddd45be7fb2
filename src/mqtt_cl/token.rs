/**
 * MIT License
 *
 * Copyright (c) 2025 Takatoshi Kondo
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */
use crate::mqtt_cl::error::MqttError;
use crate::mqtt_cl::message::Message;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

/// Operation a [`Token`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Connect,
    Publish,
    Disconnect,
}

/// Successful result of a tracked operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    /// CONNACK accepted the connection.
    Connect { session_present: bool },
    /// The PUBLISH was written (QoS 0) or acknowledged (QoS 1).
    Publish { packet_id: Option<u16> },
    /// DISCONNECT was written and the transport closed.
    Disconnect,
}

impl ServerResponse {
    pub fn session_present(&self) -> bool {
        matches!(
            self,
            ServerResponse::Connect {
                session_present: true
            }
        )
    }
}

pub type TokenOutcome = Result<ServerResponse, MqttError>;

#[derive(Debug, Clone, Default)]
enum TokenState {
    #[default]
    Pending,
    Complete(TokenOutcome),
}

struct TokenInner {
    kind: TokenKind,
    packet_id: Option<u16>,
    message: Option<Message>,
    state: watch::Sender<TokenState>,
}

/// Waitable handle for an asynchronous client operation.
///
/// A token is completed exactly once, either with a [`ServerResponse`] or
/// with an [`MqttError`]. Clones share the same completion, so any number of
/// tasks can wait on it.
///
/// Timing out in [`Token::wait_for`] does not cancel anything: the operation
/// keeps running and the token can still complete afterwards.
#[derive(Clone)]
pub struct Token {
    inner: Arc<TokenInner>,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, packet_id: Option<u16>, message: Option<Message>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                kind,
                packet_id,
                message,
                state: watch::Sender::new(TokenState::Pending),
            }),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.inner.kind
    }

    pub fn packet_id(&self) -> Option<u16> {
        self.inner.packet_id
    }

    /// Message carried by a publish token.
    pub fn message(&self) -> Option<&Message> {
        self.inner.message.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self.inner.state.borrow(), TokenState::Complete(_))
    }

    /// Outcome if the token has completed, `None` while pending.
    pub fn try_outcome(&self) -> Option<TokenOutcome> {
        match &*self.inner.state.borrow() {
            TokenState::Pending => None,
            TokenState::Complete(outcome) => Some(outcome.clone()),
        }
    }

    /// Waits until the operation completes.
    pub async fn wait(&self) -> TokenOutcome {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|state| matches!(state, TokenState::Complete(_)))
            .await
            .map_err(|_| MqttError::ChannelClosed)?;
        match &*state {
            TokenState::Complete(outcome) => outcome.clone(),
            TokenState::Pending => Err(MqttError::ChannelClosed),
        }
    }

    /// Waits at most `timeout` for the operation to complete.
    ///
    /// Returns [`MqttError::Timeout`] if it did not; the token stays pending.
    pub async fn wait_for(&self, timeout: Duration) -> TokenOutcome {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| MqttError::Timeout)?
    }

    /// Completes the token. Returns false if it had already completed.
    pub(crate) fn complete(&self, outcome: TokenOutcome) -> bool {
        self.inner.state.send_if_modified(|state| match state {
            TokenState::Pending => {
                *state = TokenState::Complete(outcome);
                true
            }
            TokenState::Complete(_) => false,
        })
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Token) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("kind", &self.inner.kind)
            .field("packet_id", &self.inner.packet_id)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}
