// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NIP-01 data model and wire codec.
//!
//! The structured types are codec-agnostic; the [`WireEncode`]/[`WireDecode`]
//! traits are the seam, and [`JsonCodec`] is the default implementation of the
//! canonical JSON array framing.

mod event;
mod filter;
mod message;
mod wire;

pub use event::{Event, EventTemplate};
pub use filter::Filter;
pub use message::{
    default_ack_code_prefixes, split_ack_message, ClientMessage, PublishResult, RelayMessage,
    SubscriptionId,
};
pub use wire::{CodecError, JsonCodec, WireCodec, WireDecode, WireEncode};

/// Validation failure for a protocol value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),
}

pub(crate) fn is_lowercase_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
