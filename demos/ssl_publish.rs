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
// SSL/TLS MQTT Publisher Example
//
// Connects to a broker over TLS with a client certificate, registers a last
// will, publishes one QoS 1 message and disconnects.
//
// The trust store and key store are read from the working directory:
// - `test-root-ca.crt`: CA certificate of the broker
// - `client.pem`: client certificate chain and private key
//
// Usage:
// ```bash
// cargo run --example ssl_publish -- [server_uri] [client_id]
// ```
//
// Example:
// ```bash
// cargo run --example ssl_publish -- mqtts://localhost:18884 ssl_publish_cpp
// ```
use std::env;
use std::path::Path;
use std::process;
use std::time::Duration;

use mqtt_client_tokio::mqtt_cl::{
    AsyncClient, Callback, ConnectOptions, Message, MqttError, Qos, SslOptions, Token,
};

const DEFAULT_SERVER_URI: &str = "mqtts://localhost:18884";
const DEFAULT_CLIENT_ID: &str = "ssl_publish_cpp";

const KEY_STORE: &str = "client.pem";
const TRUST_STORE: &str = "test-root-ca.crt";

const LWT_TOPIC: &str = "events/disconnect";
const LWT_PAYLOAD: &str = "Last will and testament.";

const QOS: Qos = Qos::AtLeastOnce;
const TIMEOUT: Duration = Duration::from_secs(10);

struct PrintingCallback;

impl Callback for PrintingCallback {
    fn connection_lost(&self, cause: &str) {
        println!("\nConnection lost");
        if !cause.is_empty() {
            println!("\tcause: {cause}");
        }
    }

    fn delivery_complete(&self, token: &Token) {
        match token.packet_id() {
            Some(id) => println!("\tDelivery complete for token: {id}"),
            None => println!("\tDelivery complete for token: -1"),
        }
    }
}

fn check_store(path: &str, what: &str) {
    if !Path::new(path).exists() {
        eprintln!("The {what} file does not exist: {path}");
        eprintln!("  Get a copy from \"paho.mqtt.c/test/ssl/{path}\"");
        process::exit(1);
    }
}

async fn run(client: &AsyncClient, options: ConnectOptions) -> Result<(), MqttError> {
    println!("\nConnecting...");
    let conntok = client.connect(options)?;
    println!("Waiting for the connection...");
    conntok.wait().await?;
    println!("  ...OK");

    println!("\nSending message...");
    let msg = Message::new("hello", "Hello secure C++ world!", QOS, false)?;
    client.publish(msg)?.wait_for(TIMEOUT).await?;
    println!("  ...OK");

    println!("\nDisconnecting...");
    client.disconnect()?.wait().await?;
    println!("  ...OK");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let server_uri = args.get(1).map_or(DEFAULT_SERVER_URI, String::as_str);
    let client_id = args.get(2).map_or(DEFAULT_CLIENT_ID, String::as_str);

    check_store(TRUST_STORE, "trust store");
    check_store(KEY_STORE, "key store");

    println!("Initializing for server '{server_uri}'...");
    let client = AsyncClient::new(server_uri, client_id).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    client.set_callback(PrintingCallback);

    let ssl = SslOptions::builder()
        .trust_store(TRUST_STORE)
        .key_store(KEY_STORE)
        .error_handler(|msg| eprintln!("SSL Error: {msg}"))
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: Invalid SSL options: {e}");
            process::exit(1);
        });

    let will = Message::new(LWT_TOPIC, LWT_PAYLOAD, QOS, true).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let options = ConnectOptions::builder()
        .user_name("testuser")
        .password("testpassword")
        .will(will)
        .ssl(ssl)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: Invalid connect options: {e}");
            process::exit(1);
        });
    println!("  ...OK");

    if let Err(e) = run(&client, options).await {
        eprintln!("{e}");
        process::exit(1);
    }
}
