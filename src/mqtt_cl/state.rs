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

use crate::mqtt_cl::error::MqttError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of a client connection.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
///                     |             |
///                     +--> Failed <-+
/// ```
///
/// `Failed` is terminal for the session; a new `connect` starts over from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

impl ConnectionState {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected | Failed, Connecting)
                | (Connecting, Connected | Failed | Disconnected)
                | (Connected, Disconnecting | Failed | Disconnected)
                | (Disconnecting, Disconnected | Failed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State cell shared by the client handle and its session task.
#[derive(Debug, Clone)]
pub(crate) struct SharedState {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(ConnectionState::Disconnected)),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Atomically moves to `next`, returning the previous state.
    ///
    /// Fails with [`MqttError::InvalidState`] carrying the current state when
    /// the transition is not allowed.
    pub(crate) fn transition(&self, next: ConnectionState) -> Result<ConnectionState, MqttError> {
        let mut result = Err(MqttError::InvalidState(next));
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                result = Ok(*current);
                *current = next;
                true
            } else {
                result = Err(MqttError::InvalidState(*current));
                false
            }
        });
        result
    }
}
