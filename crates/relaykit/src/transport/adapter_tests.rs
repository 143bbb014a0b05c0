// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::MockTransport;
use crate::transport::{AdapterEvent, Terminal, TransportAdapter};

async fn adapter_pair() -> (TransportAdapter, crate::test_support::MockRelay) {
    let (transport, mut relays) = MockTransport::new();
    let adapter = TransportAdapter::connect(transport.as_ref(), "wss://r", 8).unwrap();
    let relay = relays.next().await.unwrap();
    (adapter, relay)
}

#[tokio::test]
async fn open_resolves_on_opened_event() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.open().await;
    assert!(adapter.open().await.is_ok());
    Ok(())
}

#[tokio::test]
async fn open_surfaces_failure_terminal() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.fail(TransportError::Connect("refused".into())).await;
    let err = adapter.open().await.unwrap_err();
    assert_eq!(err, Terminal::Failed(TransportError::Connect("refused".into())));
    Ok(())
}

#[tokio::test]
async fn open_surfaces_close_during_handshake() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.close(4008, Some("go away".into())).await;
    let err = adapter.open().await.unwrap_err();
    assert_eq!(err, Terminal::Closed { code: 4008, reason: Some("go away".into()) });
    Ok(())
}

#[tokio::test]
async fn frames_arrive_in_order() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.open().await;
    adapter.open().await.ok();

    relay.frame("one").await;
    relay.frame("two").await;
    assert_eq!(adapter.next_event().await, Some(AdapterEvent::Frame("one".into())));
    assert_eq!(adapter.next_event().await, Some(AdapterEvent::Frame("two".into())));
    Ok(())
}

#[tokio::test]
async fn terminal_is_delivered_exactly_once() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.open().await;
    adapter.open().await.ok();

    relay.close(1000, None).await;
    // A misbehaving transport keeps emitting after the terminal.
    relay.frame("late").await;
    relay.fail(TransportError::LinkClosed).await;

    assert_eq!(
        adapter.next_event().await,
        Some(AdapterEvent::Terminated(Terminal::Closed { code: 1000, reason: None }))
    );
    assert_eq!(adapter.next_event().await, None);
    assert_eq!(adapter.next_event().await, None);
    Ok(())
}

#[tokio::test]
async fn dispose_is_idempotent_and_ends_stream() -> anyhow::Result<()> {
    let (mut adapter, relay) = adapter_pair().await;
    relay.open().await;
    adapter.open().await.ok();

    adapter.dispose();
    adapter.dispose();
    assert_eq!(adapter.next_event().await, None);
    Ok(())
}

#[tokio::test]
async fn send_confirmed_passes_through_to_link() -> anyhow::Result<()> {
    let (transport, mut relays) = MockTransport::new();
    let adapter = TransportAdapter::connect(transport.as_ref(), "wss://r", 8)?;
    let mut relay = relays.next().await.expect("relay side");

    let rx = adapter.send_confirmed("[\"CLOSE\",\"s\"]".to_owned());
    assert_eq!(relay.next_sent().await.as_deref(), Some("[\"CLOSE\",\"s\"]"));
    assert_eq!(rx.await?, Ok(()));
    Ok(())
}

#[tokio::test]
async fn factory_refusal_propagates() {
    let (transport, _relays) = MockTransport::new();
    transport.refuse_next_connect(TransportError::Connect("dns".into()));
    let result = TransportAdapter::connect(transport.as_ref(), "wss://r", 8);
    assert!(matches!(result, Err(TransportError::Connect(_))));
}
