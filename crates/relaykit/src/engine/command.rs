// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reducer results: side-effect commands and application-visible outputs.

use crate::engine::ConnectionSnapshot;
use crate::error::EngineError;
use crate::protocol::{ClientMessage, Event, PublishResult, SubscriptionId};

/// A side effect the runtime must execute to realize a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenConnection { url: String },
    CloseConnection { code: Option<u16>, reason: Option<String> },
    SendToRelay { message: ClientMessage },
    EmitOutput { output: Output },
}

/// An application-visible notification emitted during reduction.
///
/// Flushed to the broadcast output stream at the end of each processing step.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    ConnectionStateChanged {
        connection: ConnectionSnapshot,
    },
    SubscriptionRegistered {
        id: SubscriptionId,
    },
    EventReceived {
        subscription_id: SubscriptionId,
        event: Event,
    },
    EndOfStoredEvents {
        subscription_id: SubscriptionId,
    },
    SubscriptionTerminated {
        subscription_id: SubscriptionId,
        message: String,
        code: Option<String>,
    },
    PublishAcknowledged {
        result: PublishResult,
    },
    Notice {
        message: String,
    },
    AuthChallenge {
        challenge: String,
        url: Option<String>,
    },
    CountResult {
        subscription_id: SubscriptionId,
        count: u64,
    },
    Error {
        error: EngineError,
    },
}
