// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concurrent executor that drives the reducer against one relay.
//!
//! All state mutation happens inside a single processing task; the public
//! methods enqueue intents and return once accepted. Connection attempts,
//! reconnect timers, and write-confirmation waiters are background tasks that
//! only ever talk back through the intent queue or pre-allocated one-shots.

mod interceptor;
mod reconnect;
mod worker;

pub use interceptor::Interceptor;
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectPolicy};

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;

use crate::engine::{Intent, Output, ReducerConfig, SessionState};
use crate::error::ConnectionFailure;
use crate::protocol::{Event, Filter, JsonCodec, SubscriptionId, WireCodec};
use crate::transport::{Transport, WebSocketTransport};
use worker::{QueuedIntent, Worker};

/// Timeouts and buffer bounds for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Open-handshake deadline. Zero falls back to the 2s default; the
    /// handshake is never allowed to wait forever.
    pub connect_timeout: Duration,
    /// Idle window between inbound frames; zero disables stale detection.
    pub read_timeout: Duration,
    pub intent_queue_capacity: usize,
    /// Inbound transport buffer; full buffer backpressures the read side.
    pub inbound_capacity: usize,
    /// Broadcast replay buffer; slow consumers drop the oldest outputs.
    pub output_capacity: usize,
    pub reducer: ReducerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2_000),
            read_timeout: Duration::from_millis(15_000),
            intent_queue_capacity: 64,
            inbound_capacity: 256,
            output_capacity: 256,
            reducer: ReducerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub(crate) fn effective_connect_timeout(&self) -> Duration {
        if self.connect_timeout.is_zero() {
            Duration::from_millis(2_000)
        } else {
            self.connect_timeout
        }
    }
}

/// Everything a runtime is built from. Defaults wire the WebSocket transport,
/// the JSON codec, and exponential backoff.
pub struct RuntimeOptions {
    pub config: RuntimeConfig,
    pub transport: Arc<dyn Transport>,
    pub codec: Arc<dyn WireCodec>,
    pub policy: Arc<dyn ReconnectPolicy>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            transport: Arc::new(WebSocketTransport::default()),
            codec: Arc::new(JsonCodec::default()),
            policy: Arc::new(ExponentialBackoff::default()),
            interceptors: Vec::new(),
        }
    }
}

/// Connection counters published on the telemetry stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayTelemetry {
    /// Connection attempts since the last user-initiated connect.
    pub attempt: u32,
    /// Whether the latest attempt came from the reconnect scheduler.
    pub is_retrying: bool,
    pub last_failure: Option<ConnectionFailure>,
    pub connected_url: Option<String>,
}

/// Resolution of a publish write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The frame reached the wire.
    Success,
    Timeout,
    /// Encoding or the transport write failed, or the runtime shut down first.
    Failed,
}

/// Resolves once the published event has been written to the wire.
#[derive(Debug)]
pub struct PublishHandle {
    event_id: String,
    rx: oneshot::Receiver<WriteOutcome>,
}

impl PublishHandle {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Wait for the write outcome. Resolves exactly once; a vanished runtime
    /// counts as `Failed`.
    pub async fn outcome(self) -> WriteOutcome {
        self.rx.await.unwrap_or(WriteOutcome::Failed)
    }

    /// Like [`outcome`](Self::outcome) with a deadline.
    pub async fn outcome_within(self, limit: Duration) -> WriteOutcome {
        match tokio::time::timeout(limit, self.rx).await {
            Err(_) => WriteOutcome::Timeout,
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => WriteOutcome::Failed,
        }
    }
}

/// The runtime rejected an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime has shut down")]
    ShutDown,
}

/// One relay session: engine, transport, timers, and telemetry behind an
/// intent queue.
pub struct RelayRuntime {
    intent_tx: mpsc::Sender<QueuedIntent>,
    state_rx: watch::Receiver<SessionState>,
    output_tx: broadcast::Sender<Output>,
    telemetry_rx: watch::Receiver<RelayTelemetry>,
    shutdown: CancellationToken,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

impl RelayRuntime {
    /// Spawn the processing task. Must be called inside a tokio runtime.
    pub fn new(options: RuntimeOptions) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(options.config.intent_queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (output_tx, _) = broadcast::channel(options.config.output_capacity.max(1));
        let (telemetry_tx, telemetry_rx) = watch::channel(RelayTelemetry::default());
        let shutdown = CancellationToken::new();

        let worker = Worker::new(
            options,
            intent_rx,
            intent_tx.clone(),
            state_tx,
            output_tx.clone(),
            telemetry_tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(worker.run());

        Self {
            intent_tx,
            state_rx,
            output_tx,
            telemetry_rx,
            shutdown,
            worker: StdMutex::new(Some(handle)),
        }
    }

    pub async fn connect(&self, url: impl Into<String>) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Connect { url: url.into() }).await
    }

    pub async fn disconnect(&self) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Disconnect { code: None, reason: None }).await
    }

    pub async fn disconnect_with(
        &self,
        code: u16,
        reason: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Disconnect { code: Some(code), reason: Some(reason.into()) }).await
    }

    pub async fn subscribe(
        &self,
        id: SubscriptionId,
        filters: Vec<Filter>,
    ) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Subscribe { id, filters }).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Unsubscribe { id }).await
    }

    /// Queue an event for publication and return a handle that resolves once
    /// the frame is written to the wire (or definitively is not).
    pub async fn publish(&self, event: Event) -> Result<PublishHandle, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        let event_id = event.id.clone();
        self.intent_tx
            .send(QueuedIntent {
                intent: Intent::Publish { event },
                publish_confirm: Some(tx),
                from_reconnect: false,
            })
            .await
            .map_err(|_| RuntimeError::ShutDown)?;
        Ok(PublishHandle { event_id, rx })
    }

    pub async fn authenticate(&self, event: Event) -> Result<(), RuntimeError> {
        self.enqueue(Intent::Authenticate { event }).await
    }

    /// Stop the processing task, tear down the transport, and resolve every
    /// in-flight publish handle to `Failed`. The runtime is not reusable
    /// afterwards; `disconnect` is the reusable variant.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Subscribe to application outputs. The stream has a bounded replay
    /// buffer; lagging consumers lose the oldest entries.
    pub fn outputs(&self) -> broadcast::Receiver<Output> {
        self.output_tx.subscribe()
    }

    /// [`outputs`](Self::outputs) wrapped for `StreamExt` consumers.
    pub fn output_stream(&self) -> BroadcastStream<Output> {
        BroadcastStream::new(self.output_tx.subscribe())
    }

    /// Watch session state snapshots.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// [`state`](Self::state) wrapped for `StreamExt` consumers.
    pub fn state_stream(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state_rx.clone())
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub fn telemetry(&self) -> watch::Receiver<RelayTelemetry> {
        self.telemetry_rx.clone()
    }

    async fn enqueue(&self, intent: Intent) -> Result<(), RuntimeError> {
        self.intent_tx
            .send(QueuedIntent { intent, publish_confirm: None, from_reconnect: false })
            .await
            .map_err(|_| RuntimeError::ShutDown)
    }
}

impl Drop for RelayRuntime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
