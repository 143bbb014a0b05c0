// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use indexmap::IndexMap;
use yare::parameterized;

use super::{record_publish_status, remember_event_id, PublishStatus};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

// ── remember_event_id ─────────────────────────────────────────────────

#[test]
fn append_evicts_oldest_beyond_limit() {
    let mut buffer = ids(&["a", "b", "c"]);
    remember_event_id(&mut buffer, "d", 3);
    assert_eq!(buffer, ids(&["b", "c", "d"]));
}

#[test]
fn append_moves_existing_id_to_end() {
    let mut buffer = ids(&["a", "b", "c"]);
    remember_event_id(&mut buffer, "a", 3);
    assert_eq!(buffer, ids(&["b", "c", "a"]));
}

#[parameterized(
    zero_limit_keeps_empty = { 0, &[] },
    limit_one_keeps_latest = { 1, &["x"] },
)]
fn limit_boundaries(limit: usize, expected: &[&str]) {
    let mut buffer = ids(&["a", "b"]);
    remember_event_id(&mut buffer, "x", limit);
    assert_eq!(buffer, ids(expected));
}

// ── record_publish_status ─────────────────────────────────────────────

#[test]
fn insertion_order_is_arrival_order() {
    let mut statuses = IndexMap::new();
    for id in ["one", "two", "three"] {
        record_publish_status(&mut statuses, id, PublishStatus::Pending, 10);
    }
    let keys: Vec<_> = statuses.keys().cloned().collect();
    assert_eq!(keys, ids(&["one", "two", "three"]));
}

#[test]
fn oldest_entries_are_evicted_at_cap() {
    let mut statuses = IndexMap::new();
    for id in ["one", "two", "three"] {
        record_publish_status(&mut statuses, id, PublishStatus::Pending, 2);
    }
    let keys: Vec<_> = statuses.keys().cloned().collect();
    assert_eq!(keys, ids(&["two", "three"]));
}

#[test]
fn rerecording_moves_to_end() {
    let mut statuses = IndexMap::new();
    for id in ["one", "two"] {
        record_publish_status(&mut statuses, id, PublishStatus::Pending, 10);
    }
    record_publish_status(&mut statuses, "one", PublishStatus::Pending, 10);
    let keys: Vec<_> = statuses.keys().cloned().collect();
    assert_eq!(keys, ids(&["two", "one"]));
    assert_eq!(statuses.len(), 2);
}
