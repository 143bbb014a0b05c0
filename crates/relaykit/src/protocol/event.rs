// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed Nostr events and unsigned templates.

use serde::{Deserialize, Serialize};

use crate::protocol::{is_lowercase_hex, ProtocolError};

/// A signed, immutable Nostr event.
///
/// Hex fields are lowercase: `id`/`pubkey` are 64 chars, `sig` is 128. The
/// canonical id is the SHA-256 of the compact JSON serialization
/// `[0, pubkey, created_at, kind, tags, content]` — see
/// [`crate::crypto::canonical_event_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Check the structural invariants: hex field shapes and non-empty tags.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !is_lowercase_hex(&self.id, 64) {
            return Err(ProtocolError::InvalidEvent(format!(
                "id must be 64 lowercase hex chars, got {:?}",
                self.id
            )));
        }
        if !is_lowercase_hex(&self.pubkey, 64) {
            return Err(ProtocolError::InvalidEvent(format!(
                "pubkey must be 64 lowercase hex chars, got {:?}",
                self.pubkey
            )));
        }
        if !is_lowercase_hex(&self.sig, 128) {
            return Err(ProtocolError::InvalidEvent(
                "sig must be 128 lowercase hex chars".to_owned(),
            ));
        }
        if self.tags.iter().any(Vec::is_empty) {
            return Err(ProtocolError::InvalidEvent("tag arrays must be non-empty".to_owned()));
        }
        Ok(())
    }

    /// First value of the first tag whose name matches, e.g. `tag_value("e")`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().is_some_and(|n| n == name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// The `challenge` tag value of a NIP-42 auth event, if present.
    pub fn challenge_tag(&self) -> Option<&str> {
        self.tag_value("challenge")
    }

    /// The compact JSON serialization hashed to produce the canonical id.
    pub fn canonical_json(&self) -> String {
        // serde_json cannot fail on this shape; fall back to an empty array so
        // a mismatching id is reported instead of a panic.
        serde_json::to_string(&(
            0u8,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .unwrap_or_else(|_| "[]".to_owned())
    }
}

/// An unsigned event body, handed to a [`crate::crypto::Signer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub kind: u16,
    pub created_at: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
