// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnection delay strategies.
//!
//! Policies never touch the transport: they yield a delay, a timer task turns
//! it into a `Connect` intent, and cancelling the timer cancels the reconnect
//! regardless of policy.

use std::time::Duration;

use rand::Rng;

use crate::error::ConnectionFailure;

/// Consulted by the runtime after a connection closes or fails.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before reconnect attempt `attempt` (1-based). `None` gives up.
    fn next_delay(&self, attempt: u32, last_failure: Option<&ConnectionFailure>)
        -> Option<Duration>;
}

/// Never reconnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32, _last: Option<&ConnectionFailure>) -> Option<Duration> {
        None
    }
}

/// Constant delay, optionally capped by attempt count.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, max_attempts: None }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, attempt: u32, _last: Option<&ConnectionFailure>) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// `min(base * 2^(attempt-1), max)` with uniform jitter in
/// `±jitter_factor * delay`, clamped to at least one millisecond.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
    /// In `[0, 1]`; 0 makes the schedule fully deterministic.
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_millis(15_000),
            max_attempts: Some(10),
            jitter_factor: 0.25,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, max_attempts: None, jitter_factor: 0.0 }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, _last: Option<&ConnectionFailure>) -> Option<Duration> {
        let attempt = attempt.max(1);
        if let Some(max_attempts) = self.max_attempts {
            if attempt >= max_attempts {
                return None;
            }
        }
        let base_ms = self.base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
        let mut delay_ms = scaled.min(self.max.as_millis() as u64);
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter > 0.0 {
            let spread = (delay_ms as f64 * jitter).round() as i64;
            if spread > 0 {
                let offset = rand::rng().random_range(-spread..=spread);
                delay_ms = delay_ms.saturating_add_signed(offset);
            }
        }
        Some(Duration::from_millis(delay_ms.max(1)))
    }
}

#[cfg(test)]
#[path = "reconnect_tests.rs"]
mod tests;
