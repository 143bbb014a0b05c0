// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cryptography seams.
//!
//! Key handling and schnorr signatures live outside this crate; the engine only
//! needs a digest for canonical-id verification and a [`Signer`] to produce
//! NIP-42 auth events.

use sha2::{Digest, Sha256};

use crate::protocol::{Event, EventTemplate};

/// Digest used for canonical event ids.
pub trait Hasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> [u8; 32];
}

/// The standard NIP-01 hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }
}

/// Compute the canonical id of `event` as lowercase hex.
pub fn canonical_event_id(hasher: &dyn Hasher, event: &Event) -> String {
    hex::encode(hasher.hash(event.canonical_json().as_bytes()))
}

/// Signing failure reported by an external [`Signer`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("signing failed: {0}")]
pub struct SignerError(pub String);

/// External signing seam: turns an [`EventTemplate`] into a signed [`Event`].
pub trait Signer: Send + Sync {
    fn public_key(&self) -> String;
    fn sign(&self, template: EventTemplate) -> Result<Event, SignerError>;
}

/// Build and sign the NIP-42 (kind 22242) response to an auth challenge.
pub fn build_auth_event(
    signer: &dyn Signer,
    challenge: &str,
    relay_url: &str,
    created_at: u64,
) -> Result<Event, SignerError> {
    signer.sign(EventTemplate {
        kind: 22242,
        created_at,
        tags: vec![
            vec!["relay".to_owned(), relay_url.to_owned()],
            vec!["challenge".to_owned(), challenge.to_owned()],
        ],
        content: String::new(),
    })
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
