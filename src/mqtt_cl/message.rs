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
use crate::mqtt_cl::packet::{MAX_FIELD_LENGTH, Qos};
use bytes::Bytes;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};

/// Application message: a topic, a payload and its delivery parameters.
///
/// Messages are immutable once built. The same type is used for regular
/// publications and for the last will registered in CONNECT.
///
/// ```ignore
/// use mqtt_client_tokio::mqtt_cl::{Message, Qos};
///
/// let msg = Message::builder()
///     .topic("hello")
///     .payload("Hello secure world!")
///     .qos(Qos::AtLeastOnce)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Getters, CopyGetters)]
#[builder(
    derive(Debug),
    pattern = "owned",
    setter(into),
    build_fn(validate = "Self::validate")
)]
pub struct Message {
    /// Topic name. Must not be empty, must not contain `+` or `#`.
    #[getset(get = "pub")]
    topic: String,

    /// # Default
    /// empty
    #[builder(default)]
    #[getset(get = "pub")]
    payload: Bytes,

    /// # Default
    /// [`Qos::AtMostOnce`]
    #[builder(default)]
    #[getset(get_copy = "pub")]
    qos: Qos,

    /// # Default
    /// false
    #[builder(default = "false")]
    #[getset(get_copy = "pub")]
    retain: bool,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Creates a message, validating the topic.
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: Qos,
        retain: bool,
    ) -> Result<Self, MqttError> {
        let topic = topic.into();
        validate_topic(&topic).map_err(MqttError::InvalidTopic)?;
        Ok(Self::from_parts(topic, payload.into(), qos, retain))
    }

    /// Creates a message without topic validation. Used for packets read off the wire.
    pub(crate) fn from_parts(topic: String, payload: Bytes, qos: Qos, retain: bool) -> Self {
        Self {
            topic,
            payload,
            qos,
            retain,
        }
    }

    /// Payload interpreted as UTF-8, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl MessageBuilder {
    fn validate(&self) -> Result<(), String> {
        match &self.topic {
            Some(topic) => validate_topic(topic),
            None => Ok(()),
        }
    }
}

fn validate_topic(topic: &str) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic must not be empty".to_string());
    }
    if topic.len() > MAX_FIELD_LENGTH {
        return Err(format!(
            "topic of {} bytes exceeds {MAX_FIELD_LENGTH} bytes",
            topic.len()
        ));
    }
    if topic.contains(['+', '#']) {
        return Err(format!("topic '{topic}' contains a wildcard character"));
    }
    if topic.contains('\0') {
        return Err("topic must not contain NUL".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let msg = Message::builder().topic("hello").build().unwrap();
        assert_eq!(msg.topic(), "hello");
        assert!(msg.payload().is_empty());
        assert_eq!(msg.qos(), Qos::AtMostOnce);
        assert!(!msg.retain());
    }

    #[test]
    fn wildcard_topic_is_rejected() {
        assert!(Message::builder().topic("a/+/b").build().is_err());
        assert!(matches!(
            Message::new("a/#", "x", Qos::AtMostOnce, false),
            Err(MqttError::InvalidTopic(_))
        ));
    }

    #[test]
    fn empty_and_oversized_topics_are_rejected() {
        assert!(Message::new("", "x", Qos::AtMostOnce, false).is_err());
        let long = "t".repeat(MAX_FIELD_LENGTH + 1);
        assert!(Message::new(long, "x", Qos::AtMostOnce, false).is_err());
    }

    #[test]
    fn missing_topic_fails_build() {
        assert!(Message::builder().payload("x").build().is_err());
    }
}
