// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single processing task behind [`super::RelayRuntime`].
//!
//! Everything mutable — engine state, the link reference, the pending-write
//! map, telemetry — lives inside this task. Connection attempts and reconnect
//! timers are separate tasks that report back exclusively through the intent
//! queue, so the reducer observes one linear history.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{Command, ConnectionSnapshot, Engine, Intent, Output, SessionState};
use crate::error::{ConnectionFailure, ConnectionFailureReason};
use crate::protocol::{ClientMessage, WireCodec};
use crate::runtime::interceptor::{notify, Interceptor};
use crate::runtime::{ReconnectPolicy, RelayTelemetry, RuntimeConfig, RuntimeOptions, WriteOutcome};
use crate::transport::{
    AdapterEvent, Terminal, Transport, TransportAdapter, TransportError, TransportLink,
};

/// One queue entry: the intent plus runtime-only bookkeeping.
pub(crate) struct QueuedIntent {
    pub(crate) intent: Intent,
    /// For `Publish`: resolves when the write is confirmed.
    pub(crate) publish_confirm: Option<oneshot::Sender<WriteOutcome>>,
    /// Marks `Connect`s minted by the reconnect scheduler.
    pub(crate) from_reconnect: bool,
}

impl QueuedIntent {
    fn internal(intent: Intent) -> Self {
        Self { intent, publish_confirm: None, from_reconnect: false }
    }
}

pub(crate) struct Worker {
    engine: Engine,
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn WireCodec>,
    policy: Arc<dyn ReconnectPolicy>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,

    intent_rx: mpsc::Receiver<QueuedIntent>,
    intent_tx: mpsc::Sender<QueuedIntent>,
    /// Intents produced while executing commands; drained before the queue so
    /// a step's consequences are observed in order.
    loopback: VecDeque<QueuedIntent>,

    state_tx: watch::Sender<SessionState>,
    output_tx: broadcast::Sender<Output>,
    output_buf: Vec<Output>,
    telemetry_tx: watch::Sender<RelayTelemetry>,
    telemetry: RelayTelemetry,

    link: Option<Arc<dyn TransportLink>>,
    current_url: Option<String>,
    attempt_cancel: Option<CancellationToken>,
    attempt_task: Option<JoinHandle<()>>,
    /// Latest minted attempt token; stale attempt tasks stop enqueuing.
    attempt_seq: Arc<AtomicU64>,

    reconnect_timer: Option<(CancellationToken, JoinHandle<()>)>,
    /// Consecutive failed attempts since the last successful open.
    reconnect_attempt: u32,

    pending_writes: HashMap<String, oneshot::Sender<WriteOutcome>>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        options: RuntimeOptions,
        intent_rx: mpsc::Receiver<QueuedIntent>,
        intent_tx: mpsc::Sender<QueuedIntent>,
        state_tx: watch::Sender<SessionState>,
        output_tx: broadcast::Sender<Output>,
        telemetry_tx: watch::Sender<RelayTelemetry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine: Engine::new(options.config.reducer.clone()),
            config: options.config,
            transport: options.transport,
            codec: options.codec,
            policy: options.policy,
            interceptors: options.interceptors.into(),
            intent_rx,
            intent_tx,
            loopback: VecDeque::new(),
            state_tx,
            output_tx,
            output_buf: Vec::new(),
            telemetry_tx,
            telemetry: RelayTelemetry::default(),
            link: None,
            current_url: None,
            attempt_cancel: None,
            attempt_task: None,
            attempt_seq: Arc::new(AtomicU64::new(0)),
            reconnect_timer: None,
            reconnect_attempt: 0,
            pending_writes: HashMap::new(),
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let queued = if let Some(queued) = self.loopback.pop_front() {
                queued
            } else {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    queued = self.intent_rx.recv() => match queued {
                        Some(queued) => queued,
                        None => break,
                    },
                }
            };
            self.step(queued).await;
        }
        self.teardown();
    }

    async fn step(&mut self, queued: QueuedIntent) {
        let QueuedIntent { intent, publish_confirm, from_reconnect } = queued;

        // A user connect/disconnect supersedes any scheduled reconnect.
        if matches!(intent, Intent::Connect { .. } | Intent::Disconnect { .. }) {
            self.cancel_reconnect_timer();
        }
        // Disconnect while still connecting produces no CloseConnection
        // command; the in-flight attempt must not land afterwards.
        if matches!(intent, Intent::Disconnect { .. })
            && !self.engine.state().connection.is_connected()
        {
            self.cancel_attempt();
        }
        match &intent {
            Intent::Connect { .. } if !from_reconnect => {
                self.telemetry.attempt = 0;
                self.telemetry.is_retrying = false;
                self.reconnect_attempt = 0;
            }
            Intent::Connect { .. } => {
                self.telemetry.is_retrying = true;
            }
            Intent::ConnectionFailed { failure } => {
                self.telemetry.last_failure = Some(failure.clone());
            }
            Intent::ConnectionEstablished { .. } => {
                self.reconnect_attempt = 0;
            }
            _ => {}
        }
        if let Some(confirm) = publish_confirm {
            if let Intent::Publish { event } = &intent {
                self.pending_writes.insert(event.id.clone(), confirm);
            }
        }

        let reconnect_relevant =
            matches!(intent, Intent::ConnectionFailed { .. } | Intent::ConnectionClosed { .. });

        let (state, commands) = self.engine.dispatch(intent);
        self.state_tx.send_replace(state.clone());

        for command in commands {
            self.execute(command).await;
        }

        self.refresh_telemetry(&state);
        self.flush_outputs();
        if reconnect_relevant {
            self.maybe_schedule_reconnect(&state);
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::OpenConnection { url } => self.open_connection(url),
            Command::CloseConnection { code, reason } => self.close_connection(code, reason).await,
            Command::SendToRelay { message } => self.send_to_relay(message),
            Command::EmitOutput { output } => self.output_buf.push(output),
        }
    }

    fn open_connection(&mut self, url: String) {
        self.cancel_attempt();
        notify(&self.interceptors, |i| i.on_connection_opening(&url));

        let token = self.attempt_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.telemetry.attempt = self.telemetry.attempt.saturating_add(1);

        match TransportAdapter::connect(self.transport.as_ref(), &url, self.config.inbound_capacity)
        {
            Ok(adapter) => {
                tracing::debug!(relay = %url, attempt = self.telemetry.attempt, "opening connection");
                self.link = Some(adapter.link());
                self.current_url = Some(url.clone());
                let cancel = CancellationToken::new();
                let attempt = Attempt {
                    adapter,
                    url,
                    token,
                    seq: Arc::clone(&self.attempt_seq),
                    cancel: cancel.clone(),
                    intents: self.intent_tx.clone(),
                    codec: Arc::clone(&self.codec),
                    interceptors: Arc::clone(&self.interceptors),
                    connect_timeout: self.config.effective_connect_timeout(),
                    read_timeout: self.config.read_timeout,
                };
                self.attempt_cancel = Some(cancel);
                self.attempt_task = Some(tokio::spawn(attempt.run()));
            }
            Err(e) => {
                tracing::debug!(relay = %url, err = %e, "transport factory refused connection");
                let failure = ConnectionFailure::new(
                    Some(url),
                    ConnectionFailureReason::ConnectionFactory,
                    "transport factory refused connection",
                )
                .with_cause(e.to_string());
                self.loopback.push_back(QueuedIntent::internal(Intent::ConnectionFailed {
                    failure,
                }));
            }
        }
    }

    async fn close_connection(&mut self, code: Option<u16>, reason: Option<String>) {
        if let Some(link) = &self.link {
            link.close(code.unwrap_or(1000), reason);
        }
        // Wait for the connection task to observe the close; force it down if
        // the peer never answers.
        if let Some(mut task) = self.attempt_task.take() {
            let grace = self.config.effective_connect_timeout();
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                if let Some(cancel) = self.attempt_cancel.take() {
                    cancel.cancel();
                }
                task.abort();
            }
        }
        self.attempt_cancel = None;
        self.link = None;
    }

    fn send_to_relay(&mut self, message: ClientMessage) {
        let context = frame_context(&message);
        let encoded = match self.codec.encode_client_message(&message) {
            Ok(text) => text,
            Err(e) => {
                self.resolve_publish_handle(&message, WriteOutcome::Failed);
                self.loopback.push_back(QueuedIntent::internal(Intent::OutboundFailure {
                    context: context.to_owned(),
                    reason: format!("encode failed: {e}"),
                }));
                return;
            }
        };
        let Some(link) = self.link.clone() else {
            self.resolve_publish_handle(&message, WriteOutcome::Failed);
            self.loopback.push_back(QueuedIntent::internal(Intent::OutboundFailure {
                context: context.to_owned(),
                reason: "no active connection".to_owned(),
            }));
            return;
        };

        if let Some(url) = &self.current_url {
            let url = url.clone();
            notify(&self.interceptors, |i| i.on_send(&url, &message));
        }

        let confirm = link.send_confirmed(encoded);
        let handle = message
            .published_event()
            .and_then(|event| self.pending_writes.remove(&event.id));
        let intents = self.intent_tx.clone();
        let context = context.to_owned();
        tokio::spawn(async move {
            let result = match confirm.await {
                Ok(result) => result,
                Err(_) => Err(TransportError::LinkClosed),
            };
            match result {
                Ok(()) => {
                    if let Some(handle) = handle {
                        let _ = handle.send(WriteOutcome::Success);
                    }
                }
                Err(e) => {
                    if let Some(handle) = handle {
                        let _ = handle.send(WriteOutcome::Failed);
                    }
                    let _ = intents
                        .send(QueuedIntent::internal(Intent::OutboundFailure {
                            context,
                            reason: format!("write failed: {e}"),
                        }))
                        .await;
                }
            }
        });
    }

    fn resolve_publish_handle(&mut self, message: &ClientMessage, outcome: WriteOutcome) {
        if let Some(event) = message.published_event() {
            if let Some(handle) = self.pending_writes.remove(&event.id) {
                let _ = handle.send(outcome);
            }
        }
    }

    fn refresh_telemetry(&mut self, state: &SessionState) {
        self.telemetry.connected_url = match &state.connection {
            ConnectionSnapshot::Connected { url } => Some(url.clone()),
            _ => None,
        };
        self.telemetry_tx.send_replace(self.telemetry.clone());
    }

    fn flush_outputs(&mut self) {
        for output in self.output_buf.drain(..) {
            // No receivers is fine; outputs are fire-and-forget.
            let _ = self.output_tx.send(output);
        }
    }

    fn maybe_schedule_reconnect(&mut self, state: &SessionState) {
        let Some(url) = state.desired_relay_url.clone() else { return };
        if matches!(
            state.connection,
            ConnectionSnapshot::Connected { .. } | ConnectionSnapshot::Connecting { .. }
        ) {
            return;
        }
        let attempt = self.reconnect_attempt + 1;
        let Some(delay) = self.policy.next_delay(attempt, self.telemetry.last_failure.as_ref())
        else {
            tracing::debug!(relay = %url, attempt, "reconnect policy gave up");
            return;
        };
        self.reconnect_attempt = attempt;
        self.cancel_reconnect_timer();

        tracing::debug!(relay = %url, attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let cancel = CancellationToken::new();
        let timer_cancel = cancel.clone();
        let intents = self.intent_tx.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = timer_cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = intents
                        .send(QueuedIntent {
                            intent: Intent::Connect { url },
                            publish_confirm: None,
                            from_reconnect: true,
                        })
                        .await;
                }
            }
        });
        self.reconnect_timer = Some((cancel, task));
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some((cancel, task)) = self.reconnect_timer.take() {
            cancel.cancel();
            task.abort();
        }
    }

    fn cancel_attempt(&mut self) {
        if let Some(cancel) = self.attempt_cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
        self.link = None;
    }

    fn teardown(&mut self) {
        self.cancel_reconnect_timer();
        if let Some(link) = self.link.take() {
            link.close(1000, Some("shutdown".to_owned()));
        }
        self.cancel_attempt();
        for (_, handle) in self.pending_writes.drain() {
            let _ = handle.send(WriteOutcome::Failed);
        }
        // Resolve publish handles still sitting in the queue.
        self.intent_rx.close();
        while let Ok(queued) = self.intent_rx.try_recv() {
            if let Some(confirm) = queued.publish_confirm {
                let _ = confirm.send(WriteOutcome::Failed);
            }
        }
    }
}

fn frame_context(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Event(_) => "EVENT",
        ClientMessage::Req { .. } => "REQ",
        ClientMessage::Close(_) => "CLOSE",
        ClientMessage::Auth(_) => "AUTH",
    }
}

// -- Connection attempt task --------------------------------------------------

struct Attempt {
    adapter: TransportAdapter,
    url: String,
    token: u64,
    seq: Arc<AtomicU64>,
    cancel: CancellationToken,
    intents: mpsc::Sender<QueuedIntent>,
    codec: Arc<dyn WireCodec>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Attempt {
    async fn run(mut self) {
        if !self.open_phase().await {
            self.adapter.dispose();
            return;
        }
        self.read_phase().await;
        self.adapter.dispose();
    }

    /// Open handshake with deadline. Returns false when the attempt is over.
    async fn open_phase(&mut self) -> bool {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            opened = tokio::time::timeout(self.connect_timeout, self.adapter.open()) => opened,
        };
        match opened {
            Err(_) => {
                tracing::debug!(relay = %self.url, "handshake timeout");
                self.enqueue(Intent::ConnectionFailed {
                    failure: ConnectionFailure::new(
                        Some(self.url.clone()),
                        ConnectionFailureReason::OpenHandshake,
                        "handshake timeout",
                    ),
                })
                .await;
                false
            }
            Ok(Err(terminal)) => {
                let failure = match terminal {
                    Terminal::Failed(cause) => ConnectionFailure::new(
                        Some(self.url.clone()),
                        ConnectionFailureReason::OpenHandshake,
                        "connection failed during open",
                    )
                    .with_cause(cause.to_string()),
                    Terminal::Closed { code, reason } => ConnectionFailure::new(
                        Some(self.url.clone()),
                        ConnectionFailureReason::OpenHandshake,
                        "connection closed during open",
                    )
                    .with_close(Some(code), reason),
                };
                self.enqueue(Intent::ConnectionFailed { failure }).await;
                false
            }
            Ok(Ok(())) => {
                self.enqueue(Intent::ConnectionEstablished { url: self.url.clone() }).await;
                notify(&self.interceptors, |i| i.on_connection_established(&self.url));
                true
            }
        }
    }

    /// Connected phase: decode inbound frames, watch the idle timer.
    async fn read_phase(&mut self) {
        loop {
            let event = if self.read_timeout.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    event = self.adapter.next_event() => event,
                }
            } else {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    event = tokio::time::timeout(self.read_timeout, self.adapter.next_event()) => {
                        match event {
                            Ok(event) => event,
                            Err(_) => {
                                tracing::debug!(relay = %self.url, "idle timeout");
                                self.enqueue(Intent::ConnectionFailed {
                                    failure: ConnectionFailure::new(
                                        Some(self.url.clone()),
                                        ConnectionFailureReason::StreamFailure,
                                        "idle timeout: no frame within the read window",
                                    ),
                                })
                                .await;
                                return;
                            }
                        }
                    }
                }
            };

            match event {
                Some(AdapterEvent::Frame(text)) => {
                    let message = self.codec.decode_relay_message(&text);
                    notify(&self.interceptors, |i| i.on_message_received(&self.url, &message));
                    self.enqueue(Intent::RelayFrame { message }).await;
                }
                Some(AdapterEvent::Terminated(Terminal::Closed { code, reason })) => {
                    notify(&self.interceptors, |i| {
                        i.on_connection_closed(&self.url, Some(code), reason.as_deref())
                    });
                    self.enqueue(Intent::ConnectionClosed {
                        url: self.url.clone(),
                        code,
                        reason,
                    })
                    .await;
                    return;
                }
                Some(AdapterEvent::Terminated(Terminal::Failed(cause))) => {
                    self.enqueue(Intent::ConnectionFailed {
                        failure: ConnectionFailure::new(
                            Some(self.url.clone()),
                            ConnectionFailureReason::StreamFailure,
                            "connection stream failed",
                        )
                        .with_cause(cause.to_string()),
                    })
                    .await;
                    return;
                }
                None => {
                    self.enqueue(Intent::ConnectionClosed {
                        url: self.url.clone(),
                        code: 1000,
                        reason: Some("EOF".to_owned()),
                    })
                    .await;
                    return;
                }
            }
        }
    }

    /// Enqueue unless a newer attempt has superseded this one.
    async fn enqueue(&self, intent: Intent) {
        if self.seq.load(Ordering::SeqCst) != self.token {
            return;
        }
        let _ = self.intents.send(QueuedIntent::internal(intent)).await;
    }
}
