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
use crate::mqtt_cl::message::Message;
use crate::mqtt_cl::state::ConnectionState;
use crate::mqtt_cl::token::{Token, TokenKind, TokenOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry shared by a client handle and its session task.
pub(crate) type SharedRegistry = Arc<Mutex<TokenRegistry>>;

/// Locks `registry`. The lock is never held across an `.await`.
pub(crate) fn lock_registry(registry: &SharedRegistry) -> MutexGuard<'_, TokenRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pending tokens of one kind, keyed by packet identifier.
#[derive(Debug)]
struct IdTable {
    tokens: HashMap<u16, Token>,
    next_id: u16,
}

impl Default for IdTable {
    fn default() -> Self {
        Self {
            tokens: HashMap::new(),
            next_id: 1,
        }
    }
}

impl IdTable {
    /// Picks the next identifier not currently pending, cycling through 1..=65535.
    fn allocate(&mut self) -> Result<u16, MqttError> {
        if self.tokens.len() >= usize::from(u16::MAX) {
            return Err(MqttError::PacketIdExhausted);
        }
        loop {
            let candidate = self.next_id;
            self.next_id = if self.next_id == u16::MAX {
                1
            } else {
                self.next_id + 1
            };
            if !self.tokens.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    fn sorted(&self) -> Vec<Token> {
        let mut ids: Vec<u16> = self.tokens.keys().copied().collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| self.tokens.get(id).cloned()).collect()
    }
}

/// Table of in-flight operations awaiting a broker response.
///
/// Publish and disconnect tokens are keyed by a packet identifier that is
/// unique among the pending tokens of the same kind; identifiers are only
/// recycled after the token holding them is resolved. At most one connect
/// token is pending at a time.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    connect: Option<Token>,
    publish: IdTable,
    disconnect: IdTable,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending operation and returns its token.
    ///
    /// For publish and disconnect, `packet_id` of `None` allocates a free
    /// identifier. An explicit identifier that is still pending is rejected.
    /// The identifier is ignored for connect.
    pub fn register(
        &mut self,
        kind: TokenKind,
        packet_id: Option<u16>,
        message: Option<Message>,
    ) -> Result<Token, MqttError> {
        let table = match kind {
            TokenKind::Connect => {
                if self.connect.is_some() {
                    return Err(MqttError::InvalidState(ConnectionState::Connecting));
                }
                let token = Token::new(kind, None, message);
                self.connect = Some(token.clone());
                return Ok(token);
            }
            TokenKind::Publish => &mut self.publish,
            TokenKind::Disconnect => &mut self.disconnect,
        };

        let id = match packet_id {
            Some(0) => return Err(MqttError::InvalidOptions("packet identifier 0".into())),
            Some(id) if table.tokens.contains_key(&id) => {
                return Err(MqttError::PacketIdInUse(id));
            }
            Some(id) => id,
            None => table.allocate()?,
        };
        let token = Token::new(kind, Some(id), message);
        table.tokens.insert(id, token.clone());
        Ok(token)
    }

    /// Resolves the pending token for `kind`/`packet_id` with `outcome`.
    ///
    /// Returns the token if this call completed it. Unknown identifiers and
    /// tokens resolved earlier are ignored and yield `None`.
    pub fn resolve(
        &mut self,
        kind: TokenKind,
        packet_id: Option<u16>,
        outcome: TokenOutcome,
    ) -> Option<Token> {
        let token = match kind {
            TokenKind::Connect => self.connect.take()?,
            TokenKind::Publish => self.publish.tokens.remove(&packet_id?)?,
            TokenKind::Disconnect => self.disconnect.tokens.remove(&packet_id?)?,
        };
        token.complete(outcome).then_some(token)
    }

    pub fn is_pending(&self, kind: TokenKind, packet_id: Option<u16>) -> bool {
        match (kind, packet_id) {
            (TokenKind::Connect, _) => self.connect.is_some(),
            (TokenKind::Publish, Some(id)) => self.publish.tokens.contains_key(&id),
            (TokenKind::Disconnect, Some(id)) => self.disconnect.tokens.contains_key(&id),
            (_, None) => false,
        }
    }

    /// Pending tokens of `kind` ordered by packet identifier.
    pub fn pending(&self, kind: TokenKind) -> Vec<Token> {
        match kind {
            TokenKind::Connect => self.connect.iter().cloned().collect(),
            TokenKind::Publish => self.publish.sorted(),
            TokenKind::Disconnect => self.disconnect.sorted(),
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.connect.is_some())
            + self.publish.tokens.len()
            + self.disconnect.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails every pending token of `kind` with `error`.
    pub fn fail_kind(&mut self, kind: TokenKind, error: &MqttError) -> Vec<Token> {
        let drained: Vec<Token> = match kind {
            TokenKind::Connect => self.connect.take().into_iter().collect(),
            TokenKind::Publish => self.publish.tokens.drain().map(|(_, t)| t).collect(),
            TokenKind::Disconnect => self.disconnect.tokens.drain().map(|(_, t)| t).collect(),
        };
        drained
            .into_iter()
            .filter(|token| token.complete(Err(error.clone())))
            .collect()
    }

    /// Fails every pending token with `error`. Used on session teardown.
    pub fn fail_all(&mut self, error: &MqttError) -> Vec<Token> {
        let mut failed = self.fail_kind(TokenKind::Connect, error);
        failed.extend(self.fail_kind(TokenKind::Publish, error));
        failed.extend(self.fail_kind(TokenKind::Disconnect, error));
        failed
    }
}
