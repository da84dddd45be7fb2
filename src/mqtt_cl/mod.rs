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

// Client modules
pub mod callback;
pub mod client;
pub mod connect_options;
mod connection;
pub mod connection_option;
pub mod error;
pub mod message;
pub mod packet;
mod request;
pub mod server_uri;
pub mod ssl_options;
pub mod state;
pub mod token;
pub mod token_registry;
pub mod transport;

pub use callback::Callback;
pub use client::AsyncClient;
pub use connect_options::{ConnectOptions, ConnectOptionsBuilder};
pub use connection_option::{ConnectionOption, ConnectionOptionBuilder};
pub use error::MqttError;
pub use message::{Message, MessageBuilder};
pub use packet::{ConnectReturnCode, Qos};
pub use server_uri::{Scheme, ServerUri};
pub use ssl_options::{ErrorHandler, SslOptions, SslOptionsBuilder};
pub use state::ConnectionState;
pub use token::{ServerResponse, Token, TokenKind, TokenOutcome};
pub use token_registry::TokenRegistry;
pub use transport::{TransportError, TransportOps};
