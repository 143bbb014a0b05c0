// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reducer inputs: client intents and observed transport/relay events.

use crate::error::ConnectionFailure;
use crate::protocol::{Event, Filter, RelayMessage, SubscriptionId};

/// One input to the reducer.
///
/// User-facing operations and transport callbacks funnel through the same
/// queue, so the reducer sees a single linear history.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Connect {
        url: String,
    },
    Disconnect {
        code: Option<u16>,
        reason: Option<String>,
    },
    Subscribe {
        id: SubscriptionId,
        filters: Vec<Filter>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Publish {
        event: Event,
    },
    Authenticate {
        event: Event,
    },
    /// The transport finished its open handshake.
    ConnectionEstablished {
        url: String,
    },
    /// The transport closed cleanly.
    ConnectionClosed {
        url: String,
        code: u16,
        reason: Option<String>,
    },
    ConnectionFailed {
        failure: ConnectionFailure,
    },
    /// A decoded inbound frame.
    RelayFrame {
        message: RelayMessage,
    },
    /// A command the runtime could not carry out (encode or send failure).
    OutboundFailure {
        context: String,
        reason: String,
    },
}
