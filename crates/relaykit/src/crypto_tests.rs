// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::Event;
use crate::test_support::hex_field;

/// Signer stub: stamps a fixed key and derives the id from the hasher so the
/// produced event is self-consistent without real schnorr machinery.
struct StubSigner;

impl Signer for StubSigner {
    fn public_key(&self) -> String {
        hex_field(0xab, 64)
    }

    fn sign(&self, template: EventTemplate) -> Result<Event, SignerError> {
        let mut event = Event {
            id: String::new(),
            pubkey: self.public_key(),
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig: hex_field(0xcd, 128),
        };
        event.id = canonical_event_id(&Sha256Hasher, &event);
        Ok(event)
    }
}

#[test]
fn auth_event_carries_relay_and_challenge_tags() {
    let event = build_auth_event(&StubSigner, "ch-77", "wss://r", 1_700_000_123).unwrap();
    assert_eq!(event.kind, 22242);
    assert_eq!(event.created_at, 1_700_000_123);
    assert_eq!(event.tag_value("relay"), Some("wss://r"));
    assert_eq!(event.challenge_tag(), Some("ch-77"));
    assert!(event.validate().is_ok());
}

#[test]
fn stub_signed_event_passes_canonical_verification() {
    let event = build_auth_event(&StubSigner, "ch", "wss://r", 0).unwrap();
    assert_eq!(canonical_event_id(&Sha256Hasher, &event), event.id);
}

#[test]
fn sha256_hasher_is_deterministic() {
    let a = Sha256Hasher.hash(b"payload");
    let b = Sha256Hasher.hash(b"payload");
    assert_eq!(a, b);
    assert_ne!(a, Sha256Hasher.hash(b"payload2"));
}

#[test]
fn epoch_secs_is_past_2023() {
    assert!(epoch_secs() > 1_672_531_200);
}
