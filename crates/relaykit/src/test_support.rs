// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable in-memory transport and event
//! builders.
//!
//! [`MockTransport`] records every outbound frame and lets tests drive the
//! relay side of the conversation: open the link, inject frames, close or fail
//! it, and (in manual mode) decide the fate of individual write confirmations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, oneshot};

use crate::protocol::Event;
use crate::transport::{SendStatus, Transport, TransportError, TransportEvent, TransportLink};

/// Scriptable transport: each `connect` yields a [`MockRelay`] on the paired
/// [`MockRelays`] stream.
pub struct MockTransport {
    relay_tx: mpsc::UnboundedSender<MockRelay>,
    refusals: StdMutex<VecDeque<TransportError>>,
    auto_confirm: AtomicBool,
}

/// Receiving side handed to the test: one [`MockRelay`] per connection attempt.
pub struct MockRelays {
    rx: mpsc::UnboundedReceiver<MockRelay>,
}

impl MockRelays {
    /// The relay end of the next connection attempt.
    pub async fn next(&mut self) -> Option<MockRelay> {
        self.rx.recv().await
    }
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, MockRelays) {
        let (relay_tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            relay_tx,
            refusals: StdMutex::new(VecDeque::new()),
            auto_confirm: AtomicBool::new(true),
        });
        (transport, MockRelays { rx })
    }

    /// Make the next `connect` call fail at the factory.
    pub fn refuse_next_connect(&self, error: TransportError) {
        if let Ok(mut refusals) = self.refusals.lock() {
            refusals.push_back(error);
        }
    }

    /// Stop auto-acknowledging confirmed sends; tests resolve them through
    /// [`MockRelay::resolve_confirm`].
    pub fn manual_confirm(&self) {
        self.auto_confirm.store(false, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        url: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError> {
        if let Ok(mut refusals) = self.refusals.lock() {
            if let Some(error) = refusals.pop_front() {
                return Err(error);
            }
        }
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let confirms = Arc::new(StdMutex::new(VecDeque::new()));
        let closes = Arc::new(StdMutex::new(Vec::new()));
        let link = MockLink {
            events: events.clone(),
            sent_tx,
            confirms: Arc::clone(&confirms),
            closes: Arc::clone(&closes),
            auto_confirm: self.auto_confirm.load(Ordering::SeqCst),
        };
        let relay = MockRelay { url: url.to_owned(), events, sent_rx, confirms, closes };
        let _ = self.relay_tx.send(relay);
        Ok(Box::new(link))
    }
}

type PendingConfirm = (String, oneshot::Sender<Result<(), TransportError>>);

struct MockLink {
    events: mpsc::Sender<TransportEvent>,
    sent_tx: mpsc::UnboundedSender<String>,
    confirms: Arc<StdMutex<VecDeque<PendingConfirm>>>,
    closes: Arc<StdMutex<Vec<(u16, Option<String>)>>>,
    auto_confirm: bool,
}

impl TransportLink for MockLink {
    fn send(&self, frame: String) -> SendStatus {
        let _ = self.sent_tx.send(frame);
        SendStatus::Accepted
    }

    fn send_confirmed(&self, frame: String) -> oneshot::Receiver<Result<(), TransportError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.sent_tx.send(frame.clone());
        if self.auto_confirm {
            let _ = tx.send(Ok(()));
        } else if let Ok(mut confirms) = self.confirms.lock() {
            confirms.push_back((frame, tx));
        }
        rx
    }

    fn close(&self, code: u16, reason: Option<String>) {
        if let Ok(mut closes) = self.closes.lock() {
            closes.push((code, reason.clone()));
        }
        // A well-behaved peer completes the close handshake promptly.
        let _ = self.events.try_send(TransportEvent::Closed { code, reason });
    }
}

/// The relay side of one mock connection.
pub struct MockRelay {
    pub url: String,
    events: mpsc::Sender<TransportEvent>,
    sent_rx: mpsc::UnboundedReceiver<String>,
    confirms: Arc<StdMutex<VecDeque<PendingConfirm>>>,
    closes: Arc<StdMutex<Vec<(u16, Option<String>)>>>,
}

impl MockRelay {
    /// Complete the open handshake.
    pub async fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened).await;
    }

    /// Deliver a raw inbound frame.
    pub async fn frame(&self, raw: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Frame(raw.into())).await;
    }

    /// Close the connection from the relay side.
    pub async fn close(&self, code: u16, reason: Option<String>) {
        let _ = self.events.send(TransportEvent::Closed { code, reason }).await;
    }

    /// Fail the connection.
    pub async fn fail(&self, error: TransportError) {
        let _ = self.events.send(TransportEvent::Failed(error)).await;
    }

    /// Next frame the client wrote, in order.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }

    /// Frames written so far without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent_rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Resolve the oldest pending write confirmation (manual mode only).
    /// Returns the confirmed frame.
    pub fn resolve_confirm(&self, result: Result<(), TransportError>) -> Option<String> {
        let (frame, tx) = self.confirms.lock().ok()?.pop_front()?;
        let _ = tx.send(result);
        Some(frame)
    }

    /// Close codes/reasons the client requested on this link.
    pub fn requested_closes(&self) -> Vec<(u16, Option<String>)> {
        self.closes.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// A structurally valid event with deterministic hex fields derived from `seed`.
pub fn test_event(seed: u8, kind: u16) -> Event {
    Event {
        id: hex_field(seed, 64),
        pubkey: hex_field(seed.wrapping_add(1), 64),
        created_at: 1_700_000_000 + u64::from(seed),
        kind,
        tags: Vec::new(),
        content: format!("event-{seed}"),
        sig: hex_field(seed.wrapping_add(2), 128),
    }
}

/// A hex string of `len` chars repeating `byte`'s low nibble pattern.
pub fn hex_field(byte: u8, len: usize) -> String {
    let pair = format!("{byte:02x}");
    pair.repeat(len / 2)
}
