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
use bytes::Bytes;
use mqtt_client_tokio::mqtt_cl::packet::{
    self, Connack, Connect, ConnectReturnCode, Decoded, Packet, Puback, Publish,
};
use mqtt_client_tokio::mqtt_cl::{Message, Qos};

fn sample_packets() -> Vec<Packet> {
    let will = Message::new(
        "events/disconnect",
        "Last will and testament.",
        Qos::AtLeastOnce,
        true,
    )
    .unwrap();
    vec![
        Packet::Connect(Connect {
            client_id: "ssl_publish".into(),
            keep_alive: 20,
            clean_session: true,
            will: Some(will),
            user_name: Some("testuser".into()),
            password: Some(Bytes::from_static(b"testpassword")),
        }),
        Packet::Connack(Connack {
            session_present: true,
            return_code: ConnectReturnCode::Accepted,
        }),
        Packet::Publish(Publish {
            topic: "hello".into(),
            payload: Bytes::from(vec![0x5a; 300]),
            qos: Qos::AtLeastOnce,
            retain: true,
            dup: true,
            packet_id: Some(513),
        }),
        Packet::Publish(Publish {
            topic: "t".into(),
            payload: Bytes::new(),
            qos: Qos::AtMostOnce,
            retain: false,
            dup: false,
            packet_id: None,
        }),
        Packet::Puback(Puback { packet_id: 65535 }),
        Packet::Pingreq,
        Packet::Pingresp,
        Packet::Disconnect,
    ]
}

#[test]
fn every_strict_prefix_is_incomplete() {
    for packet in sample_packets() {
        let bytes = packet::encode(&packet).unwrap();
        for len in 0..bytes.len() {
            assert_eq!(
                packet::decode(&bytes[..len]).unwrap(),
                Decoded::Incomplete,
                "{:?} prefix of {len} bytes",
                packet.packet_type()
            );
        }
        assert_eq!(
            packet::decode(&bytes).unwrap(),
            Decoded::Complete {
                packet: packet.clone(),
                consumed: bytes.len()
            }
        );
    }
}

#[test]
fn back_to_back_packets_decode_in_order() {
    let packets = sample_packets();
    let mut stream = Vec::new();
    for packet in &packets {
        stream.extend_from_slice(&packet::encode(packet).unwrap());
    }

    let mut offset = 0;
    let mut decoded = Vec::new();
    while offset < stream.len() {
        match packet::decode(&stream[offset..]).unwrap() {
            Decoded::Complete { packet, consumed } => {
                decoded.push(packet);
                offset += consumed;
            }
            Decoded::Incomplete => panic!("stream ended mid-packet at {offset}"),
        }
    }
    assert_eq!(decoded, packets);
}

#[test]
fn large_payload_uses_multi_byte_remaining_length() {
    let publish = Packet::Publish(Publish {
        topic: "big".into(),
        payload: Bytes::from(vec![1u8; 20_000]),
        qos: Qos::AtMostOnce,
        retain: false,
        dup: false,
        packet_id: None,
    });
    let bytes = packet::encode(&publish).unwrap();
    // 2 + 3 + 20000 = 20005 needs three length bytes.
    assert_eq!(
        packet::decode_remaining_length(&bytes[1..]).unwrap(),
        Some((20_005, 3))
    );
    assert_eq!(bytes.len(), 1 + 3 + 20_005);
}

#[test]
fn connect_fields_survive_the_wire() {
    let Packet::Connect(original) = sample_packets().remove(0) else {
        unreachable!()
    };
    let bytes = packet::encode(&Packet::Connect(original.clone())).unwrap();
    // Protocol name "MQTT" and level 4 follow the fixed header.
    assert_eq!(&bytes[2..9], &[0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04]);
    // Flags: user name, password, will retain, will QoS 1, will, clean session.
    assert_eq!(bytes[9], 0b1110_1110);

    match packet::decode(&bytes).unwrap() {
        Decoded::Complete {
            packet: Packet::Connect(decoded),
            ..
        } => {
            let will = decoded.will.as_ref().unwrap();
            assert_eq!(will.topic(), "events/disconnect");
            assert_eq!(will.payload_str(), Some("Last will and testament."));
            assert!(will.retain());
            assert_eq!(decoded, original);
        }
        other => panic!("unexpected decode result: {other:?}"),
    }
}
