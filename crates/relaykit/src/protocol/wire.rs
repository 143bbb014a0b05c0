// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire codec seam and the default NIP-01 JSON implementation.

use serde_json::Value;

use crate::protocol::{
    default_ack_code_prefixes, split_ack_message, ClientMessage, Event, Filter, PublishResult,
    RelayMessage, SubscriptionId,
};

/// Encoding failure for an outbound frame.
#[derive(Debug, Clone, thiserror::Error)]
#[error("wire encoding failed: {0}")]
pub struct CodecError(pub String);

/// Encodes structured client frames to the wire.
pub trait WireEncode: Send + Sync {
    fn encode_client_message(&self, message: &ClientMessage) -> Result<String, CodecError>;
    fn encode_event(&self, event: &Event) -> Result<String, CodecError>;
    fn encode_filter(&self, filter: &Filter) -> Result<String, CodecError>;
}

/// Decodes raw relay frames.
///
/// Never fails: anything unintelligible comes back as [`RelayMessage::Unknown`].
pub trait WireDecode: Send + Sync {
    fn decode_relay_message(&self, raw: &str) -> RelayMessage;
}

/// Both halves of the codec seam, as the runtime consumes it.
pub trait WireCodec: WireEncode + WireDecode {}

impl<T: WireEncode + WireDecode> WireCodec for T {}

/// The canonical NIP-01 JSON array framing.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    ack_code_prefixes: Vec<String>,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self { ack_code_prefixes: default_ack_code_prefixes() }
    }
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the recognized `OK`/`CLOSED` code-prefix set.
    pub fn with_ack_code_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.ack_code_prefixes = prefixes;
        self
    }

    fn unknown(raw: &str, reason: impl Into<String>) -> RelayMessage {
        RelayMessage::Unknown { raw: raw.to_owned(), reason: reason.into() }
    }
}

impl WireEncode for JsonCodec {
    fn encode_client_message(&self, message: &ClientMessage) -> Result<String, CodecError> {
        serde_json::to_string(message).map_err(|e| CodecError(e.to_string()))
    }

    fn encode_event(&self, event: &Event) -> Result<String, CodecError> {
        serde_json::to_string(event).map_err(|e| CodecError(e.to_string()))
    }

    fn encode_filter(&self, filter: &Filter) -> Result<String, CodecError> {
        serde_json::to_string(filter).map_err(|e| CodecError(e.to_string()))
    }
}

impl WireDecode for JsonCodec {
    fn decode_relay_message(&self, raw: &str) -> RelayMessage {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return Self::unknown(raw, format!("not valid JSON: {e}")),
        };
        let Some(parts) = value.as_array() else {
            return Self::unknown(raw, "frame is not a JSON array");
        };
        let Some(kind) = parts.first().and_then(Value::as_str) else {
            return Self::unknown(raw, "frame is missing a string tag");
        };

        match kind {
            "EVENT" => {
                let Some(sub) = decode_subscription_id(parts.get(1)) else {
                    return Self::unknown(raw, "EVENT: bad subscription id");
                };
                let event: Event = match parts.get(2).map(|v| serde_json::from_value(v.clone())) {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => return Self::unknown(raw, format!("EVENT: bad event: {e}")),
                    None => return Self::unknown(raw, "EVENT: missing event object"),
                };
                if let Err(e) = event.validate() {
                    return Self::unknown(raw, format!("EVENT: {e}"));
                }
                RelayMessage::Event { subscription_id: sub, event }
            }
            "OK" => {
                let (Some(event_id), Some(accepted)) = (
                    parts.get(1).and_then(Value::as_str),
                    parts.get(2).and_then(Value::as_bool),
                ) else {
                    return Self::unknown(raw, "OK: expected [\"OK\", id, bool, message]");
                };
                let message = parts.get(3).and_then(Value::as_str).unwrap_or_default();
                let (code, message) = split_ack_message(message, &self.ack_code_prefixes);
                RelayMessage::Ok(PublishResult {
                    event_id: event_id.to_owned(),
                    accepted,
                    message,
                    code,
                })
            }
            "EOSE" => match decode_subscription_id(parts.get(1)) {
                Some(sub) => RelayMessage::Eose(sub),
                None => Self::unknown(raw, "EOSE: bad subscription id"),
            },
            "CLOSED" => {
                let Some(sub) = decode_subscription_id(parts.get(1)) else {
                    return Self::unknown(raw, "CLOSED: bad subscription id");
                };
                let message = parts.get(2).and_then(Value::as_str).unwrap_or_default();
                let (code, message) = split_ack_message(message, &self.ack_code_prefixes);
                RelayMessage::Closed { subscription_id: sub, message, code }
            }
            "NOTICE" => match parts.get(1).and_then(Value::as_str) {
                Some(text) => RelayMessage::Notice(text.to_owned()),
                None => Self::unknown(raw, "NOTICE: missing text"),
            },
            "AUTH" => match parts.get(1).and_then(Value::as_str) {
                Some(challenge) => RelayMessage::AuthChallenge(challenge.to_owned()),
                None => Self::unknown(raw, "AUTH: missing challenge"),
            },
            "COUNT" => {
                let Some(sub) = decode_subscription_id(parts.get(1)) else {
                    return Self::unknown(raw, "COUNT: bad subscription id");
                };
                match parts.get(2).and_then(|v| v.get("count")).and_then(Value::as_u64) {
                    Some(count) => RelayMessage::Count { subscription_id: sub, count },
                    None => Self::unknown(raw, "COUNT: missing count"),
                }
            }
            other => Self::unknown(raw, format!("unrecognized frame tag {other:?}")),
        }
    }
}

fn decode_subscription_id(value: Option<&Value>) -> Option<SubscriptionId> {
    value.and_then(Value::as_str).and_then(|s| SubscriptionId::new(s).ok())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
