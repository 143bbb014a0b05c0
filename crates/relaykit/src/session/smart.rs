// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Eager request/response operations bound to a single relay url.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::{ConnectionSnapshot, Output};
use crate::error::EngineError;
use crate::protocol::{Event, Filter, SubscriptionId};
use crate::runtime::{RelayRuntime, WriteOutcome};
use crate::session::{EagerRetryConfig, RequestResult, SharedSubscription};

/// A runtime bound to one relay, with auto-connect and retry envelopes.
///
/// Operations connect on demand, respect a total time budget, and declare the
/// connection stale (forcing a reconnect) after enough consecutive timeouts on
/// a link that claims to be healthy.
pub struct RelaySession {
    runtime: Arc<RelayRuntime>,
    url: String,
    consecutive_timeouts: AtomicU32,
}

enum AttemptOutcome<T> {
    Done(T),
    Terminated(Option<EngineError>),
    TimedOut,
}

impl RelaySession {
    pub fn new(url: impl Into<String>, runtime: Arc<RelayRuntime>) -> Self {
        Self { runtime, url: url.into(), consecutive_timeouts: AtomicU32::new(0) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn runtime(&self) -> &Arc<RelayRuntime> {
        &self.runtime
    }

    /// Publish `event` and wait for the first response whose first `e` tag is
    /// the event's id, using a fresh ephemeral subscription.
    pub async fn request_one(
        &self,
        event: Event,
        response_filter: Filter,
        timeout: Duration,
        retry: &EagerRetryConfig,
    ) -> RequestResult<Event> {
        let correlation_id = event.id.clone();
        self.request_one_correlated(event, response_filter, correlation_id, timeout, retry).await
    }

    /// [`request_one`](Self::request_one) with an explicit correlation id.
    pub async fn request_one_correlated(
        &self,
        event: Event,
        response_filter: Filter,
        correlation_id: String,
        timeout: Duration,
        retry: &EagerRetryConfig,
    ) -> RequestResult<Event> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            if let Some(result) = self.budget_exhausted(started, timeout, attempts, retry) {
                return result;
            }
            attempts += 1;

            let remaining = timeout.saturating_sub(started.elapsed());
            if let Err(last_error) =
                self.await_connected(remaining.min(retry.eager_connect_timeout)).await
            {
                return RequestResult::ConnectionFailed { attempts, last_error };
            }

            // Start listening before the subscription (and the publish) so a
            // fast relay cannot respond into the void.
            let mut outputs = self.runtime.outputs();
            let sub_id = ephemeral_sub_id();
            if self.runtime.subscribe(sub_id.clone(), vec![response_filter.clone()]).await.is_err()
            {
                return RequestResult::ConnectionFailed { attempts, last_error: None };
            }
            if let Err(last_error) = self.publish_checked(&event, retry).await {
                let _ = self.runtime.unsubscribe(sub_id).await;
                return RequestResult::ConnectionFailed { attempts, last_error };
            }

            let window = timeout.saturating_sub(started.elapsed());
            let outcome = self
                .collect_one(&mut outputs, &sub_id, &correlation_id, window)
                .await;
            let _ = self.runtime.unsubscribe(sub_id).await;

            match outcome {
                AttemptOutcome::Done(event) => {
                    self.consecutive_timeouts.store(0, Ordering::SeqCst);
                    return RequestResult::Success(event);
                }
                AttemptOutcome::Terminated(last_error) => {
                    return RequestResult::ConnectionFailed { attempts, last_error };
                }
                AttemptOutcome::TimedOut => self.note_timeout(retry).await,
            }
        }
    }

    /// Route a correlated request through a preexisting shared subscription.
    pub async fn request_one_via(
        &self,
        shared: &SharedSubscription,
        event: Event,
        correlation_id: String,
        timeout: Duration,
        retry: &EagerRetryConfig,
    ) -> RequestResult<Event> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            if let Some(result) = self.budget_exhausted(started, timeout, attempts, retry) {
                return result;
            }
            attempts += 1;

            let remaining = timeout.saturating_sub(started.elapsed());
            if let Err(last_error) =
                self.await_connected(remaining.min(retry.eager_connect_timeout)).await
            {
                return RequestResult::ConnectionFailed { attempts, last_error };
            }

            let window = timeout.saturating_sub(started.elapsed());
            let event = event.clone();
            let outcome = shared
                .expect_and_publish(
                    correlation_id.clone(),
                    move || {
                        let runtime = Arc::clone(&self.runtime);
                        async move { runtime.publish(event).await }
                    },
                    window,
                    retry.write_timeout,
                )
                .await;

            match outcome {
                Ok(RequestResult::Success(event)) => {
                    self.consecutive_timeouts.store(0, Ordering::SeqCst);
                    return RequestResult::Success(event);
                }
                Ok(RequestResult::ConnectionFailed { last_error, .. }) => {
                    return RequestResult::ConnectionFailed { attempts, last_error };
                }
                Ok(RequestResult::Timeout { .. }) => self.note_timeout(retry).await,
                Err(_) => {
                    return RequestResult::ConnectionFailed { attempts, last_error: None };
                }
            }
        }
    }

    /// Fetch all stored events matching `filters`, completing on EOSE.
    pub async fn query(
        &self,
        filters: Vec<Filter>,
        timeout: Duration,
        retry: &EagerRetryConfig,
    ) -> RequestResult<Vec<Event>> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            if let Some(result) = self.budget_exhausted(started, timeout, attempts, retry) {
                return result;
            }
            attempts += 1;

            let remaining = timeout.saturating_sub(started.elapsed());
            if let Err(last_error) =
                self.await_connected(remaining.min(retry.eager_connect_timeout)).await
            {
                return RequestResult::ConnectionFailed { attempts, last_error };
            }

            let mut outputs = self.runtime.outputs();
            let sub_id = ephemeral_sub_id();
            if self.runtime.subscribe(sub_id.clone(), filters.clone()).await.is_err() {
                return RequestResult::ConnectionFailed { attempts, last_error: None };
            }

            let window = timeout.saturating_sub(started.elapsed());
            let outcome = self.collect_until_eose(&mut outputs, &sub_id, window).await;
            let _ = self.runtime.unsubscribe(sub_id).await;

            match outcome {
                AttemptOutcome::Done(events) => {
                    self.consecutive_timeouts.store(0, Ordering::SeqCst);
                    return RequestResult::Success(events);
                }
                AttemptOutcome::Terminated(last_error) => {
                    return RequestResult::ConnectionFailed { attempts, last_error };
                }
                AttemptOutcome::TimedOut => self.note_timeout(retry).await,
            }
        }
    }

    /// Resolve once the session is connected, connecting if necessary.
    ///
    /// On timeout the error is whatever the session recorded last.
    pub async fn await_connected(&self, limit: Duration) -> Result<(), Option<EngineError>> {
        let mut state_rx = self.runtime.state();
        let connection = state_rx.borrow().connection.clone();
        match connection {
            ConnectionSnapshot::Connected { .. } => return Ok(()),
            ConnectionSnapshot::Connecting { .. } => {}
            _ => {
                if self.runtime.connect(self.url.clone()).await.is_err() {
                    return Err(None);
                }
            }
        }
        let outcome =
            tokio::time::timeout(limit, state_rx.wait_for(|s| s.connection.is_connected())).await;
        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(None),
            Err(_) => Err(self.runtime.snapshot().last_error),
        }
    }

    /// Tear the connection down and bring it back up.
    pub async fn force_reconnect(&self) {
        tracing::debug!(relay = %self.url, "stale connection suspected; forcing reconnect");
        let _ = self.runtime.disconnect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = self.runtime.connect(self.url.clone()).await;
    }

    fn budget_exhausted<T>(
        &self,
        started: Instant,
        timeout: Duration,
        attempts: u32,
        retry: &EagerRetryConfig,
    ) -> Option<RequestResult<T>> {
        let elapsed = started.elapsed();
        if elapsed >= timeout
            || attempts >= retry.max_retries.max(1)
            || (attempts > 0 && timeout - elapsed < retry.min_retry_budget)
        {
            return Some(RequestResult::Timeout { elapsed });
        }
        None
    }

    /// Record a response timeout; force a reconnect once the connection looks
    /// stale (still "connected" but repeatedly silent).
    async fn note_timeout(&self, retry: &EagerRetryConfig) {
        let streak = self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= retry.stale_timeout_threshold
            && self.runtime.snapshot().connection.is_connected()
        {
            self.force_reconnect().await;
            self.consecutive_timeouts.store(0, Ordering::SeqCst);
        }
    }

    async fn publish_checked(
        &self,
        event: &Event,
        retry: &EagerRetryConfig,
    ) -> Result<(), Option<EngineError>> {
        let handle = match self.runtime.publish(event.clone()).await {
            Ok(handle) => handle,
            Err(_) => return Err(None),
        };
        if let Some(write_timeout) = retry.write_timeout {
            match handle.outcome_within(write_timeout).await {
                WriteOutcome::Success => {}
                WriteOutcome::Timeout | WriteOutcome::Failed => {
                    return Err(self.runtime.snapshot().last_error);
                }
            }
        }
        Ok(())
    }

    async fn collect_one(
        &self,
        outputs: &mut broadcast::Receiver<Output>,
        sub_id: &SubscriptionId,
        correlation_id: &str,
        window: Duration,
    ) -> AttemptOutcome<Event> {
        let deadline = Instant::now() + window;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return AttemptOutcome::TimedOut;
            }
            match tokio::time::timeout(left, outputs.recv()).await {
                Err(_) => return AttemptOutcome::TimedOut,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return AttemptOutcome::Terminated(None)
                }
                Ok(Ok(Output::EventReceived { subscription_id, event }))
                    if subscription_id == *sub_id =>
                {
                    if event.tag_value("e") == Some(correlation_id) {
                        return AttemptOutcome::Done(event);
                    }
                }
                Ok(Ok(Output::SubscriptionTerminated { subscription_id, .. }))
                    if subscription_id == *sub_id =>
                {
                    return AttemptOutcome::Terminated(self.runtime.snapshot().last_error);
                }
                Ok(Ok(_)) => {}
            }
        }
    }

    async fn collect_until_eose(
        &self,
        outputs: &mut broadcast::Receiver<Output>,
        sub_id: &SubscriptionId,
        window: Duration,
    ) -> AttemptOutcome<Vec<Event>> {
        let deadline = Instant::now() + window;
        let mut events = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return AttemptOutcome::TimedOut;
            }
            match tokio::time::timeout(left, outputs.recv()).await {
                Err(_) => return AttemptOutcome::TimedOut,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return AttemptOutcome::Terminated(None)
                }
                Ok(Ok(Output::EventReceived { subscription_id, event }))
                    if subscription_id == *sub_id =>
                {
                    events.push(event);
                }
                Ok(Ok(Output::EndOfStoredEvents { subscription_id }))
                    if subscription_id == *sub_id =>
                {
                    return AttemptOutcome::Done(events);
                }
                Ok(Ok(Output::SubscriptionTerminated { subscription_id, .. }))
                    if subscription_id == *sub_id =>
                {
                    return AttemptOutcome::Terminated(self.runtime.snapshot().last_error);
                }
                Ok(Ok(_)) => {}
            }
        }
    }
}

fn ephemeral_sub_id() -> SubscriptionId {
    SubscriptionId::new_unchecked(format!("eph-{}", Uuid::new_v4().simple()))
}

#[cfg(test)]
#[path = "smart_tests.rs"]
mod tests;
