// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam: a factory/link trait pair plus the async adapter.
//!
//! A [`Transport`] produces one [`TransportLink`] per connection attempt. The
//! link reports everything that happens — open completion, inbound frames, the
//! terminal close or failure — through the bounded event channel handed to
//! [`Transport::connect`], which doubles as the listener installed before any
//! I/O starts. The [`TransportAdapter`] turns that stream into the async shape
//! the runtime consumes.

mod adapter;
mod websocket;

pub use adapter::{AdapterEvent, Terminal, TransportAdapter};
pub use websocket::WebSocketTransport;

use tokio::sync::{mpsc, oneshot};

/// Failure at the transport layer, rendered owned so it can cross channels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream failed: {0}")]
    Stream(String),
    #[error("link is not connected")]
    NotConnected,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("link closed")]
    LinkClosed,
}

/// Everything a link reports back to its owner, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The open handshake completed.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// Terminal: the peer (or we) closed the connection.
    Closed { code: u16, reason: Option<String> },
    /// Terminal: the connection failed.
    Failed(TransportError),
}

/// Synchronous verdict of a fire-and-forget send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Accepted,
    NotConnected,
    Failed(TransportError),
}

/// Connection factory. One transport instance serves many attempts.
pub trait Transport: Send + Sync {
    /// Start a connection attempt to `url`, reporting progress on `events`.
    ///
    /// The returned link is live immediately; the handshake outcome arrives as
    /// [`TransportEvent::Opened`] or a terminal event.
    fn connect(
        &self,
        url: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError>;
}

/// One live (or in-handshake) connection.
pub trait TransportLink: Send + Sync {
    /// Enqueue a frame. Never blocks; a full queue or dead link is reported in
    /// the returned status.
    fn send(&self, frame: String) -> SendStatus;

    /// Enqueue a frame and resolve the receiver only after the frame has been
    /// written to the wire, or after definitive failure.
    fn send_confirmed(&self, frame: String) -> oneshot::Receiver<Result<(), TransportError>>;

    /// Begin the close handshake. Terminal outcome still arrives on the event
    /// channel.
    fn close(&self, code: u16, reason: Option<String>);
}
