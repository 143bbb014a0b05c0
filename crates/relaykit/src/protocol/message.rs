// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client/relay frame enums and publish acknowledgements.

use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::protocol::{Event, Filter, ProtocolError};

/// Client-chosen subscription identifier, 1..=64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(ProtocolError::InvalidSubscriptionId(format!(
                "length must be 1..=64, got {}",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// For internally generated ids whose shape is known to be valid.
    pub(crate) fn new_unchecked(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of an `OK` acknowledgement from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: String,
    pub accepted: bool,
    /// Human-readable message with any recognized code prefix stripped.
    pub message: String,
    /// Machine-readable prefix (`duplicate`, `rate-limited`, …) when recognized.
    pub code: Option<String>,
}

/// Frames the client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Event(Event),
    Req { subscription_id: SubscriptionId, filters: Vec<Filter> },
    Close(SubscriptionId),
    Auth(Event),
}

impl ClientMessage {
    /// The published event when this frame is an `EVENT`, for write-confirmation routing.
    pub fn published_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }
}

// Serialized straight to the array framing, without a Value detour, so event
// objects keep their declared field order on the wire.
impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        match self {
            Self::Event(event) => {
                seq.serialize_element("EVENT")?;
                seq.serialize_element(event)?;
            }
            Self::Req { subscription_id, filters } => {
                seq.serialize_element("REQ")?;
                seq.serialize_element(subscription_id.as_str())?;
                for filter in filters {
                    seq.serialize_element(filter)?;
                }
            }
            Self::Close(subscription_id) => {
                seq.serialize_element("CLOSE")?;
                seq.serialize_element(subscription_id.as_str())?;
            }
            Self::Auth(event) => {
                seq.serialize_element("AUTH")?;
                seq.serialize_element(event)?;
            }
        }
        seq.end()
    }
}

/// Frames the relay sends to the client.
///
/// `Unknown` carries frames that failed to decode; the reducer turns them into
/// protocol-violation outputs without touching state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event { subscription_id: SubscriptionId, event: Event },
    Ok(PublishResult),
    Eose(SubscriptionId),
    Closed { subscription_id: SubscriptionId, message: String, code: Option<String> },
    Notice(String),
    AuthChallenge(String),
    Count { subscription_id: SubscriptionId, count: u64 },
    Unknown { raw: String, reason: String },
}

/// The conventional NIP-01 machine-readable prefixes.
///
/// The set is conventional, not normative; [`crate::protocol::JsonCodec`]
/// accepts a custom list so new codes are not silently dropped.
pub fn default_ack_code_prefixes() -> Vec<String> {
    ["duplicate", "pow", "blocked", "rate-limited", "invalid", "restricted", "error", "auth-required"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Split an `OK`/`CLOSED` message into `(code, body)`.
///
/// The prefix before the first `:` counts as a code only when it appears in
/// `prefixes`; otherwise the whole message is the body and the code is `None`.
pub fn split_ack_message(raw: &str, prefixes: &[String]) -> (Option<String>, String) {
    if let Some((head, tail)) = raw.split_once(':') {
        if prefixes.iter().any(|p| p == head) {
            return (Some(head.to_owned()), tail.trim_start().to_owned());
        }
    }
    (None, raw.to_owned())
}
