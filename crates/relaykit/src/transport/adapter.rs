// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridges a callback-style transport link to the async shape the runtime reads.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::transport::{SendStatus, Transport, TransportError, TransportEvent, TransportLink};

/// Terminal outcome of a connection, captured at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Closed { code: u16, reason: Option<String> },
    Failed(TransportError),
}

/// What the runtime sees when polling the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Frame(String),
    Terminated(Terminal),
}

/// Owns one link and its ordered inbound event stream.
///
/// Inbound frames flow through the bounded channel created here, so a slow
/// consumer backpressures the transport's read side. The terminal outcome is
/// delivered exactly once; afterwards the stream reports end-of-input.
pub struct TransportAdapter {
    link: Arc<dyn TransportLink>,
    events: mpsc::Receiver<TransportEvent>,
    opened: bool,
    terminal_seen: bool,
    disposed: bool,
}

impl TransportAdapter {
    /// Create a link via `transport` with an inbound buffer of `capacity`.
    pub fn connect(
        transport: &dyn Transport,
        url: &str,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let link = transport.connect(url, tx)?;
        Ok(Self {
            link: Arc::from(link),
            events: rx,
            opened: false,
            terminal_seen: false,
            disposed: false,
        })
    }

    /// Shared handle to the link, used by the runtime for outbound frames
    /// while the adapter itself lives in the connection task.
    pub fn link(&self) -> Arc<dyn TransportLink> {
        Arc::clone(&self.link)
    }

    /// Suspend until the open handshake completes.
    ///
    /// Timeouts are the caller's concern; this only distinguishes success from
    /// a terminal outcome racing the handshake.
    pub async fn open(&mut self) -> Result<(), Terminal> {
        if self.opened {
            return Ok(());
        }
        loop {
            match self.events.recv().await {
                Some(TransportEvent::Opened) => {
                    self.opened = true;
                    return Ok(());
                }
                // Frames before Opened would be a transport bug; drop them
                // rather than reorder past the handshake.
                Some(TransportEvent::Frame(_)) => continue,
                Some(TransportEvent::Closed { code, reason }) => {
                    self.terminal_seen = true;
                    return Err(Terminal::Closed { code, reason });
                }
                Some(TransportEvent::Failed(cause)) => {
                    self.terminal_seen = true;
                    return Err(Terminal::Failed(cause));
                }
                None => {
                    self.terminal_seen = true;
                    return Err(Terminal::Failed(TransportError::LinkClosed));
                }
            }
        }
    }

    /// Next inbound frame or the (single) terminal outcome. `None` after the
    /// terminal has been delivered, after dispose, or when the transport went
    /// away without reporting one.
    pub async fn next_event(&mut self) -> Option<AdapterEvent> {
        if self.terminal_seen || self.disposed {
            return None;
        }
        loop {
            match self.events.recv().await? {
                TransportEvent::Frame(text) => return Some(AdapterEvent::Frame(text)),
                TransportEvent::Opened => continue,
                TransportEvent::Closed { code, reason } => {
                    self.terminal_seen = true;
                    return Some(AdapterEvent::Terminated(Terminal::Closed { code, reason }));
                }
                TransportEvent::Failed(cause) => {
                    self.terminal_seen = true;
                    return Some(AdapterEvent::Terminated(Terminal::Failed(cause)));
                }
            }
        }
    }

    pub fn send(&self, frame: String) -> SendStatus {
        self.link.send(frame)
    }

    pub fn send_confirmed(&self, frame: String) -> oneshot::Receiver<Result<(), TransportError>> {
        self.link.send_confirmed(frame)
    }

    pub fn close(&self, code: u16, reason: Option<String>) {
        self.link.close(code, reason);
    }

    /// Close the inbound stream and release the link. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.events.close();
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
