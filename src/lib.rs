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

//! # MQTT Client Tokio
//!
//! An asynchronous MQTT v3.1.1 publish client for tokio, with plain TCP and
//! rustls based TLS transports.
//!
//! Every operation returns a [`mqtt_cl::Token`] right away. The token
//! completes when the broker has answered: CONNACK for connect, PUBACK for a
//! QoS 1 publish, the write itself for QoS 0. A single session task per
//! connection owns the socket, retransmits unacknowledged QoS 1 PUBLISH
//! packets with the DUP flag and keeps the connection alive with PINGREQ.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mqtt_client_tokio::mqtt_cl::{AsyncClient, ConnectOptions, Message, Qos, SslOptions};
//! use std::time::Duration;
//!
//! let ssl = SslOptions::builder()
//!     .trust_store("test-root-ca.crt")
//!     .key_store("client.pem")
//!     .build()?;
//! let options = ConnectOptions::builder()
//!     .user_name("testuser")
//!     .password("testpassword")
//!     .ssl(ssl)
//!     .build()?;
//!
//! let client = AsyncClient::new("mqtts://localhost:18884", "ssl_publish")?;
//! client.connect(options)?.wait().await?;
//!
//! let msg = Message::new("hello", "Hello secure world!", Qos::AtLeastOnce, false)?;
//! client.publish(msg)?.wait_for(Duration::from_secs(10)).await?;
//! client.disconnect()?.wait().await?;
//! ```
//!
//! ## Main Components
//!
//! - [`mqtt_cl::client`]: the [`mqtt_cl::AsyncClient`] front end
//! - [`mqtt_cl::packet`]: MQTT v3.1.1 wire codec
//! - [`mqtt_cl::transport`]: TCP and TLS transports and the rustls setup
//! - [`mqtt_cl::token`] and [`mqtt_cl::token_registry`]: completion handles and
//!   packet identifier bookkeeping
//! - [`mqtt_cl::callback`]: observer for connection loss and delivery events
//!
//! ## Logging
//!
//! With the default `tracing` feature the crate emits events through the
//! `tracing` crate; without it all logging compiles away.

#[macro_use]
mod macros;

pub mod mqtt_cl;
