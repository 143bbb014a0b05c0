// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relaykit: a Nostr relay session engine.
//!
//! The crate is layered bottom-up:
//! - [`protocol`] — events, filters, client/relay frames, and the JSON wire codec.
//! - [`engine`] — the pure session reducer and its thin mutable [`engine::Engine`] wrapper.
//! - [`transport`] — the `Transport` seam, the async adapter, and the default
//!   tokio-tungstenite WebSocket implementation.
//! - [`runtime`] — the single-task executor that owns one transport per relay,
//!   drives the reducer, and applies timeouts and reconnection policy.
//! - [`session`] — eager request/response helpers and shared subscriptions.
//!
//! All state mutation is confined to the runtime's processing task; every other
//! component sees immutable snapshots through `watch`/`broadcast` streams.

pub mod crypto;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod test_support;
pub mod transport;

pub use crypto::{build_auth_event, canonical_event_id, Hasher, Sha256Hasher, Signer};
pub use engine::{
    Command, ConnectionSnapshot, Engine, Intent, Output, PublishStatus, Reducer, ReducerConfig,
    SessionState, SubscriptionState, SubscriptionStatus,
};
pub use error::{ConnectionFailure, ConnectionFailureReason, EngineError};
pub use protocol::{
    ClientMessage, Event, EventTemplate, Filter, JsonCodec, PublishResult, RelayMessage,
    SubscriptionId, WireCodec, WireDecode, WireEncode,
};
pub use runtime::{
    ExponentialBackoff, FixedDelay, Interceptor, NoReconnect, PublishHandle, ReconnectPolicy,
    RelayRuntime, RelayTelemetry, RuntimeConfig, RuntimeError, RuntimeOptions, WriteOutcome,
};
pub use session::{
    EagerRetryConfig, RelaySession, RequestResult, SessionError, SharedSubscription,
};
pub use transport::{
    SendStatus, Transport, TransportAdapter, TransportError, TransportEvent, TransportLink,
    WebSocketTransport,
};
