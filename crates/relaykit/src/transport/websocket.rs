// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default WebSocket transport on tokio-tungstenite.
//!
//! Each [`Transport::connect`] spawns one driver task that dials the relay,
//! pumps the outbound queue (resolving write confirmations after each wire
//! write), forwards inbound text frames, and reports the terminal close or
//! failure on the event channel. The link handle never touches the socket
//! directly; it only feeds the driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::transport::{SendStatus, Transport, TransportError, TransportEvent, TransportLink};

/// tokio-tungstenite transport. Must be used inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    outbound_capacity: usize,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self { outbound_capacity: 64 }
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &self,
        url: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError> {
        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        tokio::spawn(drive(url.to_owned(), events, out_rx, Arc::clone(&connected), cancel.clone()));
        Ok(Box::new(WebSocketLink { out_tx, connected, cancel }))
    }
}

enum OutboundItem {
    Frame { text: String, ack: Option<oneshot::Sender<Result<(), TransportError>>> },
    Close { code: u16, reason: Option<String> },
}

struct WebSocketLink {
    out_tx: mpsc::Sender<OutboundItem>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl TransportLink for WebSocketLink {
    fn send(&self, frame: String) -> SendStatus {
        if !self.connected.load(Ordering::SeqCst) {
            return SendStatus::NotConnected;
        }
        match self.out_tx.try_send(OutboundItem::Frame { text: frame, ack: None }) {
            Ok(()) => SendStatus::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => {
                SendStatus::Failed(TransportError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendStatus::NotConnected,
        }
    }

    fn send_confirmed(&self, frame: String) -> oneshot::Receiver<Result<(), TransportError>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if !self.connected.load(Ordering::SeqCst) {
            let _ = ack_tx.send(Err(TransportError::NotConnected));
            return ack_rx;
        }
        match self.out_tx.try_send(OutboundItem::Frame { text: frame, ack: Some(ack_tx) }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                if let OutboundItem::Frame { ack: Some(ack), .. } = item {
                    let _ = ack.send(Err(TransportError::QueueFull));
                }
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                if let OutboundItem::Frame { ack: Some(ack), .. } = item {
                    let _ = ack.send(Err(TransportError::NotConnected));
                }
            }
        }
        ack_rx
    }

    fn close(&self, code: u16, reason: Option<String>) {
        // A full queue means the driver is wedged on a dead peer; force it down.
        if self.out_tx.try_send(OutboundItem::Close { code, reason }).is_err() {
            self.cancel.cancel();
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    url: String,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::Receiver<OutboundItem>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(&url) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::debug!(relay = %url, err = %e, "websocket connect failed");
                let _ = events
                    .send(TransportEvent::Failed(TransportError::Connect(e.to_string())))
                    .await;
                return;
            }
        },
    };

    connected.store(true, Ordering::SeqCst);
    tracing::debug!(relay = %url, "websocket connected");
    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    let mut closing = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(Some(close_frame(1000, None)))).await;
                break;
            }

            item = outbound.recv() => match item {
                Some(OutboundItem::Frame { text, ack }) => {
                    match write.send(Message::Text(text.into())).await {
                        Ok(()) => {
                            if let Some(ack) = ack {
                                let _ = ack.send(Ok(()));
                            }
                        }
                        Err(e) => {
                            tracing::debug!(relay = %url, err = %e, "websocket write failed");
                            let err = TransportError::Stream(e.to_string());
                            if let Some(ack) = ack {
                                let _ = ack.send(Err(err.clone()));
                            }
                            connected.store(false, Ordering::SeqCst);
                            let _ = events.send(TransportEvent::Failed(err)).await;
                            break;
                        }
                    }
                }
                Some(OutboundItem::Close { code, reason }) => {
                    closing = true;
                    let _ = write.send(Message::Close(Some(close_frame(code, reason)))).await;
                    // Keep reading until the peer echoes the close.
                }
                // Every link handle dropped; shut the socket down.
                None => {
                    let _ = write.send(Message::Close(Some(close_frame(1000, None)))).await;
                    break;
                }
            },

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Bounded send: a slow consumer backpressures the read loop.
                    if events.send(TransportEvent::Frame(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    connected.store(false, Ordering::SeqCst);
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), non_empty(f.reason.to_string())),
                        None => (1000, None),
                    };
                    tracing::debug!(relay = %url, code, "websocket closed by peer");
                    let _ = events.send(TransportEvent::Closed { code, reason }).await;
                    break;
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(relay = %url, "ignoring binary websocket message");
                }
                Some(Ok(_)) => {} // ping/pong handled by tungstenite
                Some(Err(e)) => {
                    connected.store(false, Ordering::SeqCst);
                    tracing::debug!(relay = %url, err = %e, "websocket read failed");
                    let _ = events
                        .send(TransportEvent::Failed(TransportError::Stream(e.to_string())))
                        .await;
                    break;
                }
                None => {
                    connected.store(false, Ordering::SeqCst);
                    let code = if closing { 1000 } else { 1006 };
                    let _ = events.send(TransportEvent::Closed { code, reason: None }).await;
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Resolve any queued confirmations so their receivers never hang.
    outbound.close();
    while let Ok(item) = outbound.try_recv() {
        if let OutboundItem::Frame { ack: Some(ack), .. } = item {
            let _ = ack.send(Err(TransportError::LinkClosed));
        }
    }
}

fn close_frame(code: u16, reason: Option<String>) -> CloseFrame {
    CloseFrame { code: CloseCode::from(code), reason: reason.unwrap_or_default().into() }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
