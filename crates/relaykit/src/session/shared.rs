// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A long-lived subscription multiplexing correlated request/response pairs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::engine::Output;
use crate::protocol::{Event, Filter, SubscriptionId};
use crate::runtime::{PublishHandle, RelayRuntime, RuntimeError, WriteOutcome};
use crate::session::{RequestResult, SessionError};

type Waiters = Arc<StdMutex<HashMap<String, oneshot::Sender<Event>>>>;

/// One persistent subscription shared by many correlated exchanges.
///
/// Responses are matched to waiters by their first `e` tag. Two workers run
/// per instance: one completes waiters from `EventReceived` outputs, one
/// tracks registration/termination to drive readiness and reject orphaned
/// waiters.
pub struct SharedSubscription {
    id: SubscriptionId,
    runtime: Arc<RelayRuntime>,
    waiters: Waiters,
    ready_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl SharedSubscription {
    /// Register the subscription and start the routing workers.
    pub async fn open(
        runtime: Arc<RelayRuntime>,
        id: SubscriptionId,
        filters: Vec<Filter>,
    ) -> Result<Self, RuntimeError> {
        let waiters: Waiters = Arc::new(StdMutex::new(HashMap::new()));
        let (ready_tx, ready_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        // Both workers subscribe to outputs before the Subscribe intent is
        // queued so the registration event cannot be missed.
        spawn_event_worker(
            runtime.outputs(),
            id.clone(),
            Arc::clone(&waiters),
            cancel.clone(),
        );
        spawn_status_worker(runtime.outputs(), id.clone(), ready_tx, Arc::clone(&waiters), cancel.clone());

        runtime.subscribe(id.clone(), filters).await?;
        Ok(Self { id, runtime, waiters, ready_rx, cancel })
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Whether the subscription is currently registered with the reducer.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Register a waiter for `correlation_id`, then run `publish`.
    ///
    /// The waiter is installed before the publish starts, so a response racing
    /// the publish confirmation still lands. Duplicate correlation ids are
    /// rejected outright.
    pub async fn expect_and_publish<F, Fut>(
        &self,
        correlation_id: String,
        publish: F,
        timeout: Duration,
        write_timeout: Option<Duration>,
    ) -> Result<RequestResult<Event>, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PublishHandle, RuntimeError>>,
    {
        let started = Instant::now();
        let waiter = self.register_waiter(&correlation_id)?;

        let handle = match publish().await {
            Ok(handle) => handle,
            Err(_) => {
                self.remove_waiter(&correlation_id);
                return Ok(RequestResult::ConnectionFailed { attempts: 1, last_error: None });
            }
        };
        if let Some(write_timeout) = write_timeout {
            match handle.outcome_within(write_timeout).await {
                WriteOutcome::Success => {}
                WriteOutcome::Timeout | WriteOutcome::Failed => {
                    // The frame never reached the wire: dead link.
                    self.remove_waiter(&correlation_id);
                    let last_error = self.runtime.snapshot().last_error;
                    return Ok(RequestResult::ConnectionFailed { attempts: 1, last_error });
                }
            }
        }

        let window = timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(window, waiter).await {
            Ok(Ok(event)) => Ok(RequestResult::Success(event)),
            // Waiter dropped: the subscription terminated or the session closed.
            Ok(Err(_)) => {
                let last_error = self.runtime.snapshot().last_error;
                Ok(RequestResult::ConnectionFailed { attempts: 1, last_error })
            }
            Err(_) => {
                self.remove_waiter(&correlation_id);
                Ok(RequestResult::Timeout { elapsed: started.elapsed() })
            }
        }
    }

    /// Cancel the workers, reject all waiters, and unsubscribe.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.clear();
        }
        let _ = self.runtime.unsubscribe(self.id.clone()).await;
    }

    fn register_waiter(
        &self,
        correlation_id: &str,
    ) -> Result<oneshot::Receiver<Event>, SessionError> {
        let Ok(mut waiters) = self.waiters.lock() else {
            return Err(SessionError::Runtime(RuntimeError::ShutDown));
        };
        if waiters.contains_key(correlation_id) {
            return Err(SessionError::DuplicateCorrelation(correlation_id.to_owned()));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(correlation_id.to_owned(), tx);
        Ok(rx)
    }

    fn remove_waiter(&self, correlation_id: &str) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.remove(correlation_id);
        }
    }
}

impl Drop for SharedSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Completes waiters from matching `EventReceived` outputs.
fn spawn_event_worker(
    mut outputs: broadcast::Receiver<Output>,
    id: SubscriptionId,
    waiters: Waiters,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let output = tokio::select! {
                _ = cancel.cancelled() => return,
                output = outputs.recv() => output,
            };
            match output {
                Ok(Output::EventReceived { subscription_id, event }) if subscription_id == id => {
                    let Some(correlation) = event.tag_value("e").map(str::to_owned) else {
                        continue;
                    };
                    let waiter = waiters.lock().ok().and_then(|mut w| w.remove(&correlation));
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(event);
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

/// Tracks registration/termination to drive readiness and reject waiters.
fn spawn_status_worker(
    mut outputs: broadcast::Receiver<Output>,
    id: SubscriptionId,
    ready_tx: watch::Sender<bool>,
    waiters: Waiters,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let output = tokio::select! {
                _ = cancel.cancelled() => return,
                output = outputs.recv() => output,
            };
            match output {
                Ok(Output::SubscriptionRegistered { id: registered }) if registered == id => {
                    let _ = ready_tx.send(true);
                }
                Ok(Output::SubscriptionTerminated { subscription_id, .. })
                    if subscription_id == id =>
                {
                    tracing::debug!(subscription = %id, "shared subscription terminated by relay");
                    let _ = ready_tx.send(false);
                    // Dropping the senders rejects every outstanding waiter.
                    if let Ok(mut waiters) = waiters.lock() {
                        waiters.clear();
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
