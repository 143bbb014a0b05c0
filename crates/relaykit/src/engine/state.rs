// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable session state snapshots.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::{ConnectionFailure, EngineError};
use crate::protocol::{Event, Filter, PublishResult, SubscriptionId};

/// Connection half of the session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionSnapshot {
    #[default]
    Disconnected,
    Connecting {
        url: String,
    },
    Connected {
        url: String,
    },
    Disconnecting {
        url: String,
        code: Option<u16>,
        reason: Option<String>,
    },
    /// Sticky until the next connect attempt.
    Failed(ConnectionFailure),
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { url } | Self::Connected { url } | Self::Disconnecting { url, .. } => {
                Some(url)
            }
            Self::Failed(failure) => failure.url.as_deref(),
        }
    }
}

/// Lifecycle of a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Registered but not yet issued to the relay (no connection).
    Pending,
    /// `REQ` sent on the current connection.
    Active,
    /// `CLOSE` requested; kept alive until the relay confirms, surviving
    /// reconnects so the deferred close still reaches the relay.
    Closing,
    /// Terminated by the relay; never resubscribed.
    Closed,
}

/// Per-subscription state, including the bounded dedupe window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    pub id: SubscriptionId,
    pub filters: Vec<Filter>,
    pub status: SubscriptionStatus,
    /// Recently delivered event ids, oldest first.
    pub received_event_ids: Vec<String>,
    pub eose_received: bool,
}

impl SubscriptionState {
    pub fn new(id: SubscriptionId, filters: Vec<Filter>, status: SubscriptionStatus) -> Self {
        Self { id, filters, status, received_event_ids: Vec::new(), eose_received: false }
    }
}

/// Acknowledgement tracking for one published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Pending,
    Acknowledged(PublishResult),
}

/// Latest NIP-42 auth attempt sent on this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    pub challenge: Option<String>,
    pub event_id: String,
    pub accepted: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    /// Most recent challenge announced by the relay.
    pub challenge: Option<String>,
    pub latest_attempt: Option<AuthAttempt>,
}

/// The complete session snapshot produced by each reduction step.
///
/// `last_error` is sticky until the next `Connect`; the `Error` output on the
/// broadcast stream is the authoritative transient notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    /// Last url the client asked to connect to; cleared on explicit disconnect.
    pub desired_relay_url: Option<String>,
    pub connection: ConnectionSnapshot,
    pub subscriptions: BTreeMap<SubscriptionId, SubscriptionState>,
    /// FIFO queue of events awaiting a connection.
    pub pending_publishes: Vec<Event>,
    /// Insertion order equals arrival order; bounded by the configured limit.
    pub publish_statuses: IndexMap<String, PublishStatus>,
    pub last_error: Option<EngineError>,
    pub auth: AuthState,
}

impl SessionState {
    pub fn subscription(&self, id: &SubscriptionId) -> Option<&SubscriptionState> {
        self.subscriptions.get(id)
    }

    pub fn publish_status(&self, event_id: &str) -> Option<&PublishStatus> {
        self.publish_statuses.get(event_id)
    }
}

/// Append `id` to a dedupe window with move-to-end semantics.
///
/// A `limit` of 0 disables the window entirely (the list stays empty); with
/// limit 1 the list is exactly the latest id.
pub(crate) fn remember_event_id(ids: &mut Vec<String>, id: &str, limit: usize) {
    if limit == 0 {
        ids.clear();
        return;
    }
    ids.retain(|seen| seen != id);
    ids.push(id.to_owned());
    while ids.len() > limit {
        ids.remove(0);
    }
}

/// Record a publish status, keeping insertion order and evicting the oldest
/// entries beyond `limit`. Re-recording an id moves it to the end.
pub(crate) fn record_publish_status(
    statuses: &mut IndexMap<String, PublishStatus>,
    event_id: &str,
    status: PublishStatus,
    limit: usize,
) {
    statuses.shift_remove(event_id);
    statuses.insert(event_id.to_owned(), status);
    while statuses.len() > limit {
        statuses.shift_remove_index(0);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
