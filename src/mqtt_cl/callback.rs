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
use crate::mqtt_cl::token::Token;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Observer for asynchronous client events.
///
/// Methods are invoked from a dedicated dispatcher task, one event at a time
/// and in the order the events occurred. They never run on the I/O path, so
/// a slow observer delays later notifications but not the protocol.
///
/// # Examples
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::{Callback, Token};
///
/// struct Printer;
///
/// impl Callback for Printer {
///     fn connection_lost(&self, cause: &str) {
///         println!("connection lost: {cause}");
///     }
///
///     fn delivery_complete(&self, token: &Token) {
///         println!("delivered: {:?}", token.packet_id());
///     }
/// }
/// ```
pub trait Callback: Send + Sync {
    /// The established connection was lost. `cause` is never empty.
    fn connection_lost(&self, cause: &str) {
        let _ = cause;
    }

    /// A publish completed successfully: written for QoS 0, acknowledged for QoS 1.
    fn delivery_complete(&self, token: &Token) {
        let _ = token;
    }
}

/// Currently installed observer, shared between the client and dispatchers.
#[derive(Clone, Default)]
pub(crate) struct CallbackSlot {
    inner: Arc<RwLock<Option<Arc<dyn Callback>>>>,
}

impl CallbackSlot {
    pub(crate) fn set(&self, callback: Arc<dyn Callback>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current(&self) -> Option<Arc<dyn Callback>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub(crate) enum Event {
    ConnectionLost(String),
    DeliveryComplete(Token),
}

/// Sending half of a session's event queue.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<Event>,
}

impl Dispatcher {
    /// Spawns the dispatcher task. It ends once every `Dispatcher` clone is
    /// dropped and the queued events have been delivered.
    pub(crate) fn spawn(slot: CallbackSlot) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(callback) = slot.current() else {
                    continue;
                };
                match event {
                    Event::ConnectionLost(cause) => callback.connection_lost(&cause),
                    Event::DeliveryComplete(token) => callback.delivery_complete(&token),
                }
            }
            log_trace!("callback dispatcher finished");
        });
        Self { tx }
    }

    pub(crate) fn connection_lost(&self, cause: String) {
        let _ = self.tx.send(Event::ConnectionLost(cause));
    }

    pub(crate) fn delivery_complete(&self, token: Token) {
        let _ = self.tx.send(Event::DeliveryComplete(token));
    }
}
