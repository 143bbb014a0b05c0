// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response helpers layered on the raw runtime.
//!
//! [`RelaySession`] binds a runtime to one relay url and adds eager operations
//! that connect on demand, retry within a time budget, and force a reconnect
//! when a connected link stops answering. [`SharedSubscription`] multiplexes
//! many correlated exchanges over a single long-lived subscription.

mod shared;
mod smart;

pub use shared::SharedSubscription;
pub use smart::RelaySession;

use std::time::Duration;

use crate::error::EngineError;
use crate::runtime::RuntimeError;

/// Retry envelope for the eager operations.
#[derive(Debug, Clone)]
pub struct EagerRetryConfig {
    /// Attempts per operation, including the first.
    pub max_retries: u32,
    /// Minimum remaining budget required to start another attempt.
    pub min_retry_budget: Duration,
    /// Consecutive timeouts on a live connection before it is declared stale
    /// and torn down.
    pub stale_timeout_threshold: u32,
    /// Cap on the time spent waiting for a connection inside one attempt.
    pub eager_connect_timeout: Duration,
    /// When set, wait for the write confirmation before listening for the
    /// response; a failed write short-circuits to `ConnectionFailed`.
    pub write_timeout: Option<Duration>,
}

impl Default for EagerRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_retry_budget: Duration::from_millis(100),
            stale_timeout_threshold: 2,
            eager_connect_timeout: Duration::from_millis(2_000),
            write_timeout: None,
        }
    }
}

/// Collapsed outcome of an eager operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestResult<T> {
    Success(T),
    Timeout { elapsed: Duration },
    ConnectionFailed { attempts: u32, last_error: Option<EngineError> },
}

impl<T> RequestResult<T> {
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Failure of a shared-subscription operation itself (as opposed to a
/// collapsed request outcome).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("correlation id {0:?} already has a waiter")]
    DuplicateCorrelation(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
