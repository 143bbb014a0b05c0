// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end test harness: an in-process WebSocket relay the real transport
//! can talk to.
//!
//! The server accepts any number of sequential connections (so reconnect
//! behavior can be observed), forwards every inbound text frame to the test,
//! and writes whatever the test queues to the currently connected client.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// A single-client-at-a-time mock relay.
pub struct MockRelayServer {
    addr: SocketAddr,
    incoming_rx: mpsc::UnboundedReceiver<String>,
    outgoing_tx: mpsc::UnboundedSender<String>,
    drop_conn: Arc<Notify>,
    cancel: CancellationToken,
}

impl MockRelayServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let outgoing_rx = Arc::new(Mutex::new(outgoing_rx));
        let drop_conn = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            incoming_tx,
            Arc::clone(&outgoing_rx),
            Arc::clone(&drop_conn),
            cancel.clone(),
        ));

        Ok(Self { addr, incoming_rx, outgoing_tx, drop_conn, cancel })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next text frame received from the client, across connections.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming_rx.recv().await
    }

    /// Queue a text frame for the connected client. Frames queued while no
    /// client is connected are delivered to the next one.
    pub fn send(&self, frame: impl Into<String>) {
        let _ = self.outgoing_tx.send(frame.into());
    }

    /// Tear down the current connection (clean close from the relay side).
    pub fn drop_connection(&self) {
        self.drop_conn.notify_waiters();
    }
}

impl Drop for MockRelayServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    incoming_tx: mpsc::UnboundedSender<String>,
    outgoing_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    drop_conn: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(_) => return,
            },
        };
        serve_connection(
            stream,
            &incoming_tx,
            Arc::clone(&outgoing_rx),
            Arc::clone(&drop_conn),
            cancel.clone(),
        )
        .await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    incoming_tx: &mpsc::UnboundedSender<String>,
    outgoing_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    drop_conn: Arc<Notify>,
    cancel: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(err = %e, "mock relay: handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let mut outgoing = outgoing_rx.lock().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            _ = drop_conn.notified() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }

            frame = outgoing.recv() => match frame {
                Some(text) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                None => return,
            },

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = incoming_tx.send(text.to_string());
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Err(_)) => return,
                _ => {}
            },
        }
    }
}

/// Subscription id of a `["REQ", <id>, ...]` frame, if that is what it is.
pub fn req_sub_id(frame: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(frame).ok()?;
    let parts = value.as_array()?;
    if parts.first()?.as_str()? != "REQ" {
        return None;
    }
    parts.get(1)?.as_str().map(str::to_owned)
}

/// Event id of an `["EVENT", <event>]` client frame, if that is what it is.
pub fn published_event_id(frame: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(frame).ok()?;
    let parts = value.as_array()?;
    if parts.first()?.as_str()? != "EVENT" {
        return None;
    }
    parts.get(1)?.get("id")?.as_str().map(str::to_owned)
}
