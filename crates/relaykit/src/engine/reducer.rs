// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure session reducer.

use std::sync::Arc;

use crate::crypto::{canonical_event_id, Hasher, Sha256Hasher};
use crate::engine::state::{record_publish_status, remember_event_id};
use crate::engine::{
    AuthAttempt, Command, ConnectionSnapshot, Intent, Output, PublishStatus, SessionState,
    SubscriptionState, SubscriptionStatus,
};
use crate::error::EngineError;
use crate::protocol::{
    ClientMessage, Event, Filter, PublishResult, RelayMessage, SubscriptionId,
};

/// Tuning knobs for the reducer. All limits are hard caps on retained history.
#[derive(Clone)]
pub struct ReducerConfig {
    /// Per-subscription dedupe window; 0 disables dedupe entirely.
    pub max_event_replay_ids: usize,
    /// Bound on the acknowledgement history.
    pub max_publish_statuses: usize,
    /// Recompute canonical ids for inbound events and drop mismatches.
    pub verify_event_ids: bool,
    pub hasher: Arc<dyn Hasher>,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            max_event_replay_ids: 200,
            max_publish_statuses: 200,
            verify_event_ids: false,
            hasher: Arc::new(Sha256Hasher),
        }
    }
}

impl std::fmt::Debug for ReducerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerConfig")
            .field("max_event_replay_ids", &self.max_event_replay_ids)
            .field("max_publish_statuses", &self.max_publish_statuses)
            .field("verify_event_ids", &self.verify_event_ids)
            .finish_non_exhaustive()
    }
}

/// Pure state machine: `(state, intent) -> (state, commands)`.
///
/// Deterministic for a given configuration, performs no I/O, and never panics
/// on unexpected inputs — every anomaly becomes a typed `Error` output.
#[derive(Debug, Clone)]
pub struct Reducer {
    config: ReducerConfig,
}

impl Reducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    pub fn reduce(&self, state: &SessionState, intent: Intent) -> (SessionState, Vec<Command>) {
        match intent {
            Intent::Connect { url } => self.connect(state, url),
            Intent::Disconnect { code, reason } => self.disconnect(state, code, reason),
            Intent::Subscribe { id, filters } => self.subscribe(state, id, filters),
            Intent::Unsubscribe { id } => self.unsubscribe(state, id),
            Intent::Publish { event } => self.publish(state, event),
            Intent::Authenticate { event } => self.authenticate(state, event),
            Intent::ConnectionEstablished { url } => self.connection_established(state, url),
            Intent::ConnectionClosed { .. } => self.connection_closed(state),
            Intent::ConnectionFailed { failure } => {
                let mut next = state.clone();
                let error = EngineError::ConnectionFailure(failure.clone());
                next.connection = ConnectionSnapshot::Failed(failure);
                next.last_error = Some(error.clone());
                (next, vec![emit(Output::Error { error })])
            }
            Intent::RelayFrame { message } => self.relay_frame(state, message),
            Intent::OutboundFailure { context, reason } => {
                let mut next = state.clone();
                let error = EngineError::outbound_failure(context, reason);
                next.last_error = Some(error.clone());
                (next, vec![emit(Output::Error { error })])
            }
        }
    }

    fn connect(&self, state: &SessionState, url: String) -> (SessionState, Vec<Command>) {
        if let ConnectionSnapshot::Connected { url: current } = &state.connection {
            if *current == url {
                return (state.clone(), Vec::new());
            }
        }
        let mut next = state.clone();
        next.desired_relay_url = Some(url.clone());
        next.connection = ConnectionSnapshot::Connecting { url: url.clone() };
        next.last_error = None;
        let commands = vec![
            Command::OpenConnection { url },
            emit(Output::ConnectionStateChanged { connection: next.connection.clone() }),
        ];
        (next, commands)
    }

    fn disconnect(
        &self,
        state: &SessionState,
        code: Option<u16>,
        reason: Option<String>,
    ) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        next.desired_relay_url = None;
        if let ConnectionSnapshot::Connected { url } = &state.connection {
            next.connection = ConnectionSnapshot::Disconnecting {
                url: url.clone(),
                code,
                reason: reason.clone(),
            };
            let commands = vec![
                Command::CloseConnection { code, reason },
                emit(Output::ConnectionStateChanged { connection: next.connection.clone() }),
            ];
            (next, commands)
        } else {
            next.connection = ConnectionSnapshot::Disconnected;
            let commands =
                vec![emit(Output::ConnectionStateChanged { connection: next.connection.clone() })];
            (next, commands)
        }
    }

    fn subscribe(
        &self,
        state: &SessionState,
        id: SubscriptionId,
        filters: Vec<Filter>,
    ) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        let connected = state.connection.is_connected();
        let status =
            if connected { SubscriptionStatus::Active } else { SubscriptionStatus::Pending };
        // Replacement semantics: a prior subscription under this id loses its
        // dedupe buffer and EOSE marker.
        next.subscriptions
            .insert(id.clone(), SubscriptionState::new(id.clone(), filters.clone(), status));
        let mut commands = vec![emit(Output::SubscriptionRegistered { id: id.clone() })];
        if connected {
            commands.push(Command::SendToRelay {
                message: ClientMessage::Req { subscription_id: id, filters },
            });
        }
        (next, commands)
    }

    fn unsubscribe(&self, state: &SessionState, id: SubscriptionId) -> (SessionState, Vec<Command>) {
        if !state.subscriptions.contains_key(&id) {
            return (state.clone(), Vec::new());
        }
        let mut next = state.clone();
        if let Some(sub) = next.subscriptions.get_mut(&id) {
            sub.status = SubscriptionStatus::Closing;
        }
        let mut commands = Vec::new();
        if state.connection.is_connected() {
            commands.push(Command::SendToRelay { message: ClientMessage::Close(id) });
        }
        // Otherwise the Close is flushed on the next ConnectionEstablished.
        (next, commands)
    }

    fn publish(&self, state: &SessionState, event: Event) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        record_publish_status(
            &mut next.publish_statuses,
            &event.id,
            PublishStatus::Pending,
            self.config.max_publish_statuses,
        );
        if state.connection.is_connected() {
            (next, vec![Command::SendToRelay { message: ClientMessage::Event(event) }])
        } else {
            next.pending_publishes.push(event);
            (next, Vec::new())
        }
    }

    fn authenticate(&self, state: &SessionState, event: Event) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        if !state.connection.is_connected() {
            let error = EngineError::outbound_failure("AUTH", "not connected to a relay");
            next.last_error = Some(error.clone());
            return (next, vec![emit(Output::Error { error })]);
        }
        next.auth.latest_attempt = Some(AuthAttempt {
            challenge: event.challenge_tag().map(str::to_owned),
            event_id: event.id.clone(),
            accepted: None,
            message: None,
        });
        (next, vec![Command::SendToRelay { message: ClientMessage::Auth(event) }])
    }

    fn connection_established(
        &self,
        state: &SessionState,
        url: String,
    ) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        next.connection = ConnectionSnapshot::Connected { url };
        next.last_error = None;

        let mut commands = Vec::new();
        for event in next.pending_publishes.drain(..) {
            commands.push(Command::SendToRelay { message: ClientMessage::Event(event) });
        }
        for sub in next.subscriptions.values_mut() {
            match sub.status {
                SubscriptionStatus::Closed => {}
                SubscriptionStatus::Closing => {
                    // Deferred close: the relay never saw the CLOSE, send it now.
                    commands.push(Command::SendToRelay {
                        message: ClientMessage::Close(sub.id.clone()),
                    });
                }
                SubscriptionStatus::Pending | SubscriptionStatus::Active => {
                    // The relay resends stored events on resubscribe; an old
                    // dedupe buffer would suppress legitimate redeliveries.
                    sub.status = SubscriptionStatus::Active;
                    sub.eose_received = false;
                    sub.received_event_ids.clear();
                    commands.push(Command::SendToRelay {
                        message: ClientMessage::Req {
                            subscription_id: sub.id.clone(),
                            filters: sub.filters.clone(),
                        },
                    });
                }
            }
        }
        commands
            .push(emit(Output::ConnectionStateChanged { connection: next.connection.clone() }));
        (next, commands)
    }

    fn connection_closed(&self, state: &SessionState) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        for sub in next.subscriptions.values_mut() {
            // Closing entries survive so the deferred close reaches the relay
            // on the next connection; Closed entries stay terminated.
            if matches!(sub.status, SubscriptionStatus::Active | SubscriptionStatus::Pending) {
                sub.status = SubscriptionStatus::Pending;
            }
        }
        next.connection = ConnectionSnapshot::Disconnected;
        let connection = next.connection.clone();
        (next, vec![emit(Output::ConnectionStateChanged { connection })])
    }

    fn relay_frame(&self, state: &SessionState, message: RelayMessage) -> (SessionState, Vec<Command>) {
        match message {
            RelayMessage::Event { subscription_id, event } => {
                self.relay_event(state, subscription_id, event)
            }
            RelayMessage::Eose(subscription_id) => {
                if !state.subscriptions.contains_key(&subscription_id) {
                    return (state.clone(), vec![unknown_subscription("EOSE", &subscription_id)]);
                }
                let mut next = state.clone();
                if let Some(sub) = next.subscriptions.get_mut(&subscription_id) {
                    sub.eose_received = true;
                }
                (next, vec![emit(Output::EndOfStoredEvents { subscription_id })])
            }
            RelayMessage::Closed { subscription_id, message, code } => {
                if !state.subscriptions.contains_key(&subscription_id) {
                    return (
                        state.clone(),
                        vec![unknown_subscription("CLOSED", &subscription_id)],
                    );
                }
                let mut next = state.clone();
                if let Some(sub) = next.subscriptions.get_mut(&subscription_id) {
                    sub.status = SubscriptionStatus::Closed;
                }
                (next, vec![emit(Output::SubscriptionTerminated { subscription_id, message, code })])
            }
            RelayMessage::Ok(result) => self.publish_acknowledged(state, result),
            RelayMessage::Notice(message) => {
                (state.clone(), vec![emit(Output::Notice { message })])
            }
            RelayMessage::AuthChallenge(challenge) => {
                let mut next = state.clone();
                next.auth.challenge = Some(challenge.clone());
                let url = state.connection.url().map(str::to_owned);
                (next, vec![emit(Output::AuthChallenge { challenge, url })])
            }
            RelayMessage::Count { subscription_id, count } => {
                if !state.subscriptions.contains_key(&subscription_id) {
                    return (state.clone(), vec![unknown_subscription("COUNT", &subscription_id)]);
                }
                (state.clone(), vec![emit(Output::CountResult { subscription_id, count })])
            }
            RelayMessage::Unknown { raw, reason } => {
                let error = EngineError::protocol_violation(format!(
                    "undecodable relay frame ({reason}): {raw}"
                ));
                (state.clone(), vec![emit(Output::Error { error })])
            }
        }
    }

    fn relay_event(
        &self,
        state: &SessionState,
        subscription_id: SubscriptionId,
        event: Event,
    ) -> (SessionState, Vec<Command>) {
        if !state.subscriptions.contains_key(&subscription_id) {
            return (state.clone(), vec![unknown_subscription("EVENT", &subscription_id)]);
        }
        if self.config.verify_event_ids {
            let canonical = canonical_event_id(self.config.hasher.as_ref(), &event);
            if canonical != event.id {
                let error = EngineError::protocol_violation(format!(
                    "event id {} does not match canonical id {canonical}",
                    event.id
                ));
                return (state.clone(), vec![emit(Output::Error { error })]);
            }
        }
        let window = self.config.max_event_replay_ids;
        let mut next = state.clone();
        let Some(sub) = next.subscriptions.get_mut(&subscription_id) else {
            return (state.clone(), Vec::new());
        };
        if window > 0 && sub.received_event_ids.iter().any(|id| id == &event.id) {
            // Duplicate within the window: dropped without output.
            return (state.clone(), Vec::new());
        }
        remember_event_id(&mut sub.received_event_ids, &event.id, window);
        if matches!(sub.status, SubscriptionStatus::Pending) {
            sub.status = SubscriptionStatus::Active;
        }
        (next, vec![emit(Output::EventReceived { subscription_id, event })])
    }

    fn publish_acknowledged(
        &self,
        state: &SessionState,
        result: PublishResult,
    ) -> (SessionState, Vec<Command>) {
        let mut next = state.clone();
        record_publish_status(
            &mut next.publish_statuses,
            &result.event_id,
            PublishStatus::Acknowledged(result.clone()),
            self.config.max_publish_statuses,
        );
        if let Some(attempt) = next.auth.latest_attempt.as_mut() {
            if attempt.event_id == result.event_id {
                attempt.accepted = Some(result.accepted);
                attempt.message = Some(result.message.clone());
            }
        }
        (next, vec![emit(Output::PublishAcknowledged { result })])
    }
}

fn emit(output: Output) -> Command {
    Command::EmitOutput { output }
}

fn unknown_subscription(frame: &str, id: &SubscriptionId) -> Command {
    emit(Output::Error {
        error: EngineError::protocol_violation(format!("{frame} frame for unknown subscription {id}")),
    })
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod tests;
