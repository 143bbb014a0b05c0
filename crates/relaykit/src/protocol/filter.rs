// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription filters issued in `REQ` frames.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol::{is_lowercase_hex, ProtocolError};

/// A predicate evaluated by the relay against stored and live events.
///
/// Empty sets are omitted on the wire. Tag queries use single-character keys
/// serialized with a `#` prefix (`#e`, `#p`, …).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub ids: BTreeSet<String>,
    pub authors: BTreeSet<String>,
    pub kinds: BTreeSet<u16>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<u64>,
    pub tags: BTreeMap<char, BTreeSet<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.insert(id.into());
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.insert(pubkey.into());
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn since(mut self, ts: u64) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn until(mut self, ts: u64) -> Self {
        self.until = Some(ts);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn tag(mut self, key: char, value: impl Into<String>) -> Self {
        self.tags.entry(key).or_default().insert(value.into());
        self
    }

    /// Check hex shapes, kind ranges, and that no tag set holds an empty value.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for id in &self.ids {
            if !is_lowercase_hex(id, 64) {
                return Err(ProtocolError::InvalidFilter(format!("bad event id {id:?}")));
            }
        }
        for author in &self.authors {
            if !is_lowercase_hex(author, 64) {
                return Err(ProtocolError::InvalidFilter(format!("bad author {author:?}")));
            }
        }
        for values in self.tags.values() {
            if values.iter().any(String::is_empty) {
                return Err(ProtocolError::InvalidFilter("empty tag value".to_owned()));
            }
        }
        Ok(())
    }

    fn field_count(&self) -> usize {
        usize::from(!self.ids.is_empty())
            + usize::from(!self.authors.is_empty())
            + usize::from(!self.kinds.is_empty())
            + usize::from(self.since.is_some())
            + usize::from(self.until.is_some())
            + usize::from(self.limit.is_some())
            + self.tags.values().filter(|v| !v.is_empty()).count()
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.field_count()))?;
        if !self.ids.is_empty() {
            map.serialize_entry("ids", &self.ids)?;
        }
        if !self.authors.is_empty() {
            map.serialize_entry("authors", &self.authors)?;
        }
        if !self.kinds.is_empty() {
            map.serialize_entry("kinds", &self.kinds)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        for (key, values) in &self.tags {
            if !values.is_empty() {
                map.serialize_entry(&format!("#{key}"), values)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut filter = Filter::default();
        for (key, value) in raw {
            match key.as_str() {
                "ids" => filter.ids = from_value(value, "ids")?,
                "authors" => filter.authors = from_value(value, "authors")?,
                "kinds" => filter.kinds = from_value(value, "kinds")?,
                "since" => filter.since = Some(from_value(value, "since")?),
                "until" => filter.until = Some(from_value(value, "until")?),
                "limit" => filter.limit = Some(from_value(value, "limit")?),
                other => {
                    let mut chars = other.strip_prefix('#').unwrap_or("").chars();
                    match (chars.next(), chars.next()) {
                        (Some(tag), None) => {
                            filter.tags.insert(tag, from_value(value, "tag")?);
                        }
                        // Unknown filter fields are ignored, matching relay behavior.
                        _ => continue,
                    }
                }
            }
        }
        Ok(filter)
    }
}

fn from_value<T: serde::de::DeserializeOwned, E: serde::de::Error>(
    value: serde_json::Value,
    field: &str,
) -> Result<T, E> {
    serde_json::from_value(value).map_err(|e| E::custom(format!("{field}: {e}")))
}
