// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;
use crate::protocol::{ClientMessage, Event, Filter, RelayMessage, SubscriptionId};
use crate::test_support::{hex_field, test_event};

fn codec() -> JsonCodec {
    JsonCodec::new()
}

fn sub(id: &str) -> SubscriptionId {
    SubscriptionId::new(id).unwrap()
}

// ── encoding ──────────────────────────────────────────────────────────

#[test]
fn encode_req_with_kind_filter() {
    let message = ClientMessage::Req {
        subscription_id: sub("s"),
        filters: vec![Filter::new().kind(1)],
    };
    assert_eq!(codec().encode_client_message(&message).unwrap(), r#"["REQ","s",{"kinds":[1]}]"#);
}

#[test]
fn encode_close() {
    let message = ClientMessage::Close(sub("s"));
    assert_eq!(codec().encode_client_message(&message).unwrap(), r#"["CLOSE","s"]"#);
}

#[test]
fn encode_event_frame_carries_all_fields() {
    let event = test_event(1, 1);
    let encoded = codec().encode_client_message(&ClientMessage::Event(event.clone())).unwrap();
    let expected = format!(
        r#"["EVENT",{{"id":"{}","pubkey":"{}","created_at":{},"kind":1,"tags":[],"content":"{}","sig":"{}"}}]"#,
        event.id, event.pubkey, event.created_at, event.content, event.sig
    );
    assert_eq!(encoded, expected);
}

#[test]
fn encode_auth_uses_auth_tag() {
    let encoded =
        codec().encode_client_message(&ClientMessage::Auth(test_event(1, 22242))).unwrap();
    assert!(encoded.starts_with(r#"["AUTH",{"#));
}

#[test]
fn empty_filter_sets_are_omitted() {
    let filter = Filter::new().kind(1).since(10).tag('e', "abc");
    let encoded = codec().encode_filter(&filter).unwrap();
    assert_eq!(encoded, r##"{"kinds":[1],"since":10,"#e":["abc"]}"##);
    assert!(!encoded.contains("ids"));
    assert!(!encoded.contains("authors"));
}

// ── decoding ──────────────────────────────────────────────────────────

#[test]
fn decode_event_frame() {
    let event = test_event(3, 1);
    let raw = format!(
        r#"["EVENT","s",{}]"#,
        serde_json::to_string(&event).unwrap()
    );
    let decoded = codec().decode_relay_message(&raw);
    assert_eq!(decoded, RelayMessage::Event { subscription_id: sub("s"), event });
}

#[test]
fn decode_ok_with_recognized_prefix() {
    let decoded =
        codec().decode_relay_message(r#"["OK","ABC",true,"duplicate: already have this event"]"#);
    assert_eq!(
        decoded,
        RelayMessage::Ok(PublishResult {
            event_id: "ABC".into(),
            accepted: true,
            message: "already have this event".into(),
            code: Some("duplicate".into()),
        })
    );
}

#[test]
fn decode_ok_with_unrecognized_prefix_keeps_full_message() {
    let decoded = codec().decode_relay_message(r#"["OK","ABC",false,"weird: something new"]"#);
    assert_eq!(
        decoded,
        RelayMessage::Ok(PublishResult {
            event_id: "ABC".into(),
            accepted: false,
            message: "weird: something new".into(),
            code: None,
        })
    );
}

#[test]
fn custom_prefix_set_is_honored() {
    let codec = JsonCodec::new().with_ack_code_prefixes(vec!["weird".into()]);
    let decoded = codec.decode_relay_message(r#"["OK","ABC",false,"weird: something new"]"#);
    assert_eq!(
        decoded,
        RelayMessage::Ok(PublishResult {
            event_id: "ABC".into(),
            accepted: false,
            message: "something new".into(),
            code: Some("weird".into()),
        })
    );
}

#[test]
fn decode_closed_applies_prefix_rule() {
    let decoded = codec().decode_relay_message(r#"["CLOSED","s","auth-required: do auth first"]"#);
    assert_eq!(
        decoded,
        RelayMessage::Closed {
            subscription_id: sub("s"),
            message: "do auth first".into(),
            code: Some("auth-required".into()),
        }
    );
}

#[test]
fn decode_eose_notice_auth_count() {
    assert_eq!(codec().decode_relay_message(r#"["EOSE","s"]"#), RelayMessage::Eose(sub("s")));
    assert_eq!(
        codec().decode_relay_message(r#"["NOTICE","slow down"]"#),
        RelayMessage::Notice("slow down".into())
    );
    assert_eq!(
        codec().decode_relay_message(r#"["AUTH","ch-1"]"#),
        RelayMessage::AuthChallenge("ch-1".into())
    );
    assert_eq!(
        codec().decode_relay_message(r#"["COUNT","s",{"count":42}]"#),
        RelayMessage::Count { subscription_id: sub("s"), count: 42 }
    );
}

#[test]
fn malformed_frames_decode_to_unknown() {
    for raw in [
        "not json at all",
        r#"{"not":"an array"}"#,
        r#"[42,"missing tag"]"#,
        r#"["WHAT","ever"]"#,
        r#"["EVENT","s",{"id":"tooshort"}]"#,
        r#"["OK","id","not-bool","msg"]"#,
        r#"["COUNT","s",{}]"#,
    ] {
        let decoded = codec().decode_relay_message(raw);
        assert!(
            matches!(decoded, RelayMessage::Unknown { .. }),
            "{raw} should decode to Unknown, got {decoded:?}"
        );
    }
}

#[test]
fn unknown_preserves_raw_frame() {
    let decoded = codec().decode_relay_message(r#"["WHAT","ever"]"#);
    let RelayMessage::Unknown { raw, reason } = decoded else {
        panic!("expected Unknown");
    };
    assert_eq!(raw, r#"["WHAT","ever"]"#);
    assert!(reason.contains("WHAT"));
}

#[test]
fn event_with_invalid_hex_decodes_to_unknown() {
    let mut event = test_event(1, 1);
    event.sig = "nothex".into();
    let raw = format!(r#"["EVENT","s",{}]"#, serde_json::to_string(&event).unwrap());
    assert!(matches!(codec().decode_relay_message(&raw), RelayMessage::Unknown { .. }));
}

// ── round trips ───────────────────────────────────────────────────────

#[test]
fn event_roundtrips_through_json() {
    let mut event = test_event(7, 30023);
    event.tags = vec![vec!["e".into(), hex_field(1, 64)], vec!["t".into(), "news".into()]];
    event.content = "line1\nline2 \"quoted\" \\ backslash".into();
    let encoded = codec().encode_event(&event).unwrap();
    let decoded: Event = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn filter_roundtrips_through_json() {
    let filter = Filter::new()
        .id(hex_field(1, 64))
        .author(hex_field(2, 64))
        .kind(1)
        .kind(7)
        .since(100)
        .until(200)
        .limit(50)
        .tag('e', hex_field(3, 64))
        .tag('p', hex_field(4, 64));
    let encoded = codec().encode_filter(&filter).unwrap();
    let decoded: Filter = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, filter);
}

proptest! {
    #[test]
    fn filter_roundtrip_holds(
        kinds in proptest::collection::btree_set(0u16..=65535, 0..4),
        since in proptest::option::of(0u64..=u64::from(u32::MAX)),
        limit in proptest::option::of(0u64..10_000),
        tag_values in proptest::collection::btree_set("[a-z0-9]{1,12}", 0..3),
    ) {
        let mut filter = Filter { kinds, since, limit, ..Filter::default() };
        if !tag_values.is_empty() {
            filter.tags.insert('t', tag_values);
        }
        let encoded = codec().encode_filter(&filter).unwrap();
        let decoded: Filter = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, filter);
    }

    #[test]
    fn event_content_roundtrip_holds(content in "\\PC{0,64}") {
        let mut event = test_event(1, 1);
        event.content = content;
        let encoded = codec().encode_event(&event).unwrap();
        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, event);
    }

    /// Decoding arbitrary junk never panics and yields Unknown.
    #[test]
    fn decode_never_panics(raw in "\\PC{0,64}") {
        let _ = codec().decode_relay_message(&raw);
    }
}
