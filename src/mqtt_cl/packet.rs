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

//! MQTT v3.1.1 wire codec.
//!
//! Covers the control packets a publishing client exchanges with a broker:
//! CONNECT, CONNACK, PUBLISH, PUBACK, PINGREQ, PINGRESP and DISCONNECT.
//!
//! Decoding is incremental. [`decode`] inspects a byte buffer that may hold a
//! partial packet and reports [`Decoded::Incomplete`] until enough bytes have
//! arrived, so the caller can keep appending to the same buffer.

use crate::mqtt_cl::message::Message;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Largest value the remaining length field can carry (four 7-bit groups).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Largest string or binary field, bounded by its u16 length prefix.
pub const MAX_FIELD_LENGTH: usize = u16::MAX as usize;

pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level byte for MQTT v3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

const CONNECT_FLAG_USER_NAME: u8 = 0x80;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_WILL_RETAIN: u8 = 0x20;
const CONNECT_FLAG_WILL: u8 = 0x04;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
const CONNECT_FLAG_RESERVED: u8 = 0x01;

/// Errors produced while encoding or decoding packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("field of {0} bytes exceeds the 65535 byte limit")]
    FieldTooLong(usize),

    #[error("remaining length {0} exceeds the maximum of 268435455")]
    PacketTooLarge(usize),

    #[error("remaining length field is longer than 4 bytes")]
    InvalidRemainingLength,

    #[error("unsupported packet type {0}")]
    UnsupportedPacketType(u8),

    #[error("invalid fixed header flags {flags:#06b} for {packet_type}")]
    InvalidFlags { packet_type: PacketType, flags: u8 },

    #[error("invalid QoS value {0}")]
    InvalidQos(u8),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("unsupported protocol {name} level {level}")]
    UnsupportedProtocol { name: String, level: u8 },

    #[error("invalid CONNECT flags {0:#010b}")]
    InvalidConnectFlags(u8),

    #[error("invalid CONNACK flags {0:#010b}")]
    InvalidConnackFlags(u8),

    #[error("QoS > 0 PUBLISH requires a packet identifier")]
    MissingPacketId,

    #[error("packet identifier 0 is not allowed")]
    ZeroPacketId,

    #[error("packet body ended unexpectedly")]
    Truncated,

    #[error("{0} unexpected trailing bytes in packet body")]
    TrailingBytes(usize),

    #[error("packet of {size} bytes exceeds the limit of {limit} bytes")]
    PacketExceedsLimit { size: usize, limit: usize },
}

/// Quality of service level of a PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Qos {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Qos {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Qos {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(CodecError::InvalidQos(other)),
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS{}", self.as_u8())
    }
}

/// Control packet types understood by this codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            other => Err(CodecError::UnsupportedPacketType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        };
        f.write_str(name)
    }
}

/// CONNACK return code.
///
/// Codes 6-255 are reserved by MQTT v3.1.1 and kept as [`ConnectReturnCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    Other(u8),
}

impl ConnectReturnCode {
    pub fn as_u8(self) -> u8 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::UnacceptableProtocolVersion => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::BadUserNameOrPassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Other(code) => code,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::Accepted
    }
}

impl From<u8> for ConnectReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocolVersion,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadUserNameOrPassword,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Other(other),
        }
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectReturnCode::Accepted => f.write_str("connection accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                f.write_str("unacceptable protocol version")
            }
            ConnectReturnCode::IdentifierRejected => f.write_str("identifier rejected"),
            ConnectReturnCode::ServerUnavailable => f.write_str("server unavailable"),
            ConnectReturnCode::BadUserNameOrPassword => f.write_str("bad user name or password"),
            ConnectReturnCode::NotAuthorized => f.write_str("not authorized"),
            ConnectReturnCode::Other(code) => write!(f, "reserved return code {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    /// Keep-alive in seconds, 0 disables it.
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Message>,
    pub user_name: Option<String>,
    pub password: Option<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connack {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
    pub dup: bool,
    /// Present exactly when `qos` is greater than 0.
    pub packet_id: Option<u16>,
}

impl Publish {
    /// Builds an outgoing PUBLISH for `message`.
    pub fn from_message(message: &Message, packet_id: Option<u16>) -> Self {
        Self {
            topic: message.topic().clone(),
            payload: message.payload().clone(),
            qos: message.qos(),
            retain: message.retain(),
            dup: false,
            packet_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Puback {
    pub packet_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Publish(Publish),
    Puback(Puback),
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback(_) => PacketType::Puback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }
}

/// Result of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole packet was decoded from the first `consumed` bytes.
    Complete { packet: Packet, consumed: usize },
    /// More bytes are required.
    Incomplete,
}

/// Serializes `packet` into its wire representation.
pub fn encode(packet: &Packet) -> Result<BytesMut, CodecError> {
    let mut body = BytesMut::new();
    let flags = match packet {
        Packet::Connect(connect) => {
            encode_connect(connect, &mut body)?;
            0
        }
        Packet::Connack(connack) => {
            body.put_u8(u8::from(connack.session_present));
            body.put_u8(connack.return_code.as_u8());
            0
        }
        Packet::Publish(publish) => encode_publish(publish, &mut body)?,
        Packet::Puback(puback) => {
            put_packet_id(puback.packet_id, &mut body)?;
            0
        }
        Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => 0,
    };

    let mut out = BytesMut::with_capacity(body.len() + 5);
    out.put_u8(((packet.packet_type() as u8) << 4) | flags);
    encode_remaining_length(body.len(), &mut out)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Appends the variable length encoding of `len` to `out`.
pub fn encode_remaining_length(len: usize, out: &mut BytesMut) -> Result<(), CodecError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(CodecError::PacketTooLarge(len));
    }
    let mut value = len;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

/// Reads a remaining length field from the start of `buf`.
///
/// Returns the value and the number of bytes the field occupied, or `None`
/// when the field is not finished yet.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, CodecError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (index, byte) in buf.iter().enumerate() {
        if index == 4 {
            return Err(CodecError::InvalidRemainingLength);
        }
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(CodecError::InvalidRemainingLength);
    }
    Ok(None)
}

/// Total size of the packet starting at `buf`, known once its fixed header
/// is complete.
pub fn packet_size(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(decode_remaining_length(&buf[1..])?.map(|(remaining, field_len)| 1 + field_len + remaining))
}

/// Attempts to decode one packet from the start of `buf`.
pub fn decode(buf: &[u8]) -> Result<Decoded, CodecError> {
    let Some(&first) = buf.first() else {
        return Ok(Decoded::Incomplete);
    };
    let packet_type = PacketType::try_from(first >> 4)?;
    let flags = first & 0x0F;

    let Some((remaining, field_len)) = decode_remaining_length(&buf[1..])? else {
        return Ok(Decoded::Incomplete);
    };
    let total = 1 + field_len + remaining;
    if buf.len() < total {
        return Ok(Decoded::Incomplete);
    }

    if packet_type != PacketType::Publish && flags != 0 {
        return Err(CodecError::InvalidFlags { packet_type, flags });
    }

    let mut reader = Reader::new(&buf[1 + field_len..total]);
    let packet = match packet_type {
        PacketType::Connect => Packet::Connect(decode_connect(&mut reader)?),
        PacketType::Connack => {
            let ack_flags = reader.u8()?;
            if ack_flags & !0x01 != 0 {
                return Err(CodecError::InvalidConnackFlags(ack_flags));
            }
            Packet::Connack(Connack {
                session_present: ack_flags & 0x01 != 0,
                return_code: ConnectReturnCode::from(reader.u8()?),
            })
        }
        PacketType::Publish => Packet::Publish(decode_publish(flags, &mut reader)?),
        PacketType::Puback => Packet::Puback(Puback {
            packet_id: reader.packet_id()?,
        }),
        PacketType::Pingreq => Packet::Pingreq,
        PacketType::Pingresp => Packet::Pingresp,
        PacketType::Disconnect => Packet::Disconnect,
    };
    reader.finish()?;

    Ok(Decoded::Complete {
        packet,
        consumed: total,
    })
}

fn encode_connect(connect: &Connect, body: &mut BytesMut) -> Result<(), CodecError> {
    let mut flags = 0u8;
    if connect.clean_session {
        flags |= CONNECT_FLAG_CLEAN_SESSION;
    }
    if let Some(will) = &connect.will {
        flags |= CONNECT_FLAG_WILL | (will.qos().as_u8() << 3);
        if will.retain() {
            flags |= CONNECT_FLAG_WILL_RETAIN;
        }
    }
    if connect.user_name.is_some() {
        flags |= CONNECT_FLAG_USER_NAME;
    }
    if connect.password.is_some() {
        if connect.user_name.is_none() {
            return Err(CodecError::InvalidConnectFlags(flags | CONNECT_FLAG_PASSWORD));
        }
        flags |= CONNECT_FLAG_PASSWORD;
    }

    put_str(PROTOCOL_NAME, body)?;
    body.put_u8(PROTOCOL_LEVEL);
    body.put_u8(flags);
    body.put_u16(connect.keep_alive);
    put_str(&connect.client_id, body)?;
    if let Some(will) = &connect.will {
        put_str(will.topic(), body)?;
        put_binary(will.payload(), body)?;
    }
    if let Some(user_name) = &connect.user_name {
        put_str(user_name, body)?;
    }
    if let Some(password) = &connect.password {
        put_binary(password, body)?;
    }
    Ok(())
}

fn encode_publish(publish: &Publish, body: &mut BytesMut) -> Result<u8, CodecError> {
    put_str(&publish.topic, body)?;
    if publish.qos != Qos::AtMostOnce {
        let packet_id = publish.packet_id.ok_or(CodecError::MissingPacketId)?;
        put_packet_id(packet_id, body)?;
    }
    body.extend_from_slice(&publish.payload);

    let mut flags = publish.qos.as_u8() << 1;
    if publish.dup {
        flags |= 0x08;
    }
    if publish.retain {
        flags |= 0x01;
    }
    Ok(flags)
}

fn decode_connect(reader: &mut Reader<'_>) -> Result<Connect, CodecError> {
    let name = reader.string()?;
    let level = reader.u8()?;
    if name != PROTOCOL_NAME || level != PROTOCOL_LEVEL {
        return Err(CodecError::UnsupportedProtocol { name, level });
    }

    let flags = reader.u8()?;
    let will_flag = flags & CONNECT_FLAG_WILL != 0;
    let will_qos = Qos::try_from((flags >> 3) & 0x03)?;
    let will_retain = flags & CONNECT_FLAG_WILL_RETAIN != 0;
    let has_user_name = flags & CONNECT_FLAG_USER_NAME != 0;
    let has_password = flags & CONNECT_FLAG_PASSWORD != 0;
    if flags & CONNECT_FLAG_RESERVED != 0
        || (!will_flag && (will_retain || will_qos != Qos::AtMostOnce))
        || (has_password && !has_user_name)
    {
        return Err(CodecError::InvalidConnectFlags(flags));
    }

    let keep_alive = reader.u16()?;
    let client_id = reader.string()?;
    let will = if will_flag {
        let topic = reader.string()?;
        let payload = reader.binary()?;
        Some(Message::from_parts(topic, payload, will_qos, will_retain))
    } else {
        None
    };
    let user_name = has_user_name.then(|| reader.string()).transpose()?;
    let password = has_password.then(|| reader.binary()).transpose()?;

    Ok(Connect {
        client_id,
        keep_alive,
        clean_session: flags & CONNECT_FLAG_CLEAN_SESSION != 0,
        will,
        user_name,
        password,
    })
}

fn decode_publish(flags: u8, reader: &mut Reader<'_>) -> Result<Publish, CodecError> {
    let qos = Qos::try_from((flags >> 1) & 0x03)?;
    let dup = flags & 0x08 != 0;
    if dup && qos == Qos::AtMostOnce {
        return Err(CodecError::InvalidFlags {
            packet_type: PacketType::Publish,
            flags,
        });
    }

    let topic = reader.string()?;
    let packet_id = if qos == Qos::AtMostOnce {
        None
    } else {
        Some(reader.packet_id()?)
    };

    Ok(Publish {
        topic,
        payload: Bytes::copy_from_slice(reader.rest()),
        qos,
        retain: flags & 0x01 != 0,
        dup,
        packet_id,
    })
}

fn put_str(value: &str, out: &mut BytesMut) -> Result<(), CodecError> {
    put_binary(value.as_bytes(), out)
}

fn put_binary(value: &[u8], out: &mut BytesMut) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::FieldTooLong(value.len()))?;
    out.put_u16(len);
    out.extend_from_slice(value);
    Ok(())
}

fn put_packet_id(packet_id: u16, out: &mut BytesMut) -> Result<(), CodecError> {
    if packet_id == 0 {
        return Err(CodecError::ZeroPacketId);
    }
    out.put_u16(packet_id);
    Ok(())
}

/// Cursor over a packet body whose length is already known.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn packet_id(&mut self) -> Result<u16, CodecError> {
        match self.u16()? {
            0 => Err(CodecError::ZeroPacketId),
            id => Ok(id),
        }
    }

    fn binary(&mut self) -> Result<Bytes, CodecError> {
        let len = usize::from(self.u16()?);
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    fn finish(&self) -> Result<(), CodecError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}
