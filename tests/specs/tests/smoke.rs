// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests: the real WebSocket transport against an in-process
//! mock relay.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use relaykit::test_support::test_event;
use relaykit::{
    ConnectionSnapshot, EagerRetryConfig, Filter, FixedDelay, JsonCodec, NoReconnect, Output,
    RelayRuntime, RelaySession, RequestResult, RuntimeConfig, RuntimeOptions, SubscriptionId,
    WebSocketTransport, WriteOutcome,
};
use relaykit_specs::{published_event_id, req_sub_id, MockRelayServer};

const TIMEOUT: Duration = Duration::from_secs(10);

fn runtime(policy: Arc<dyn relaykit::ReconnectPolicy>) -> RelayRuntime {
    RelayRuntime::new(RuntimeOptions {
        config: RuntimeConfig {
            read_timeout: Duration::ZERO,
            ..RuntimeConfig::default()
        },
        transport: Arc::new(WebSocketTransport::default()),
        codec: Arc::new(JsonCodec::new()),
        policy,
        interceptors: Vec::new(),
    })
}

fn sub(id: &str) -> SubscriptionId {
    SubscriptionId::new(id).unwrap()
}

async fn wait_connected(runtime: &RelayRuntime) -> anyhow::Result<()> {
    let mut state = runtime.state();
    tokio::time::timeout(TIMEOUT, state.wait_for(|s| s.connection.is_connected())).await??;
    Ok(())
}

#[tokio::test]
async fn connect_subscribe_and_receive_event() -> anyhow::Result<()> {
    let mut server = MockRelayServer::start().await?;
    let runtime = runtime(Arc::new(NoReconnect));
    let mut outputs = runtime.output_stream();

    runtime.connect(server.url()).await?;
    wait_connected(&runtime).await?;

    runtime.subscribe(sub("s"), vec![Filter::new().kind(1)]).await?;
    let req = tokio::time::timeout(TIMEOUT, server.recv()).await?.expect("REQ frame");
    assert_eq!(req_sub_id(&req).as_deref(), Some("s"));

    let event = test_event(0x10, 1);
    server.send(format!(r#"["EVENT","s",{}]"#, serde_json::to_string(&event)?));
    server.send(r#"["EOSE","s"]"#);

    let received = tokio::time::timeout(TIMEOUT, async {
        loop {
            match outputs.next().await {
                Some(Ok(Output::EventReceived { event, .. })) => break event,
                Some(_) => continue,
                None => panic!("output stream died"),
            }
        }
    })
    .await?;
    assert_eq!(received, event);

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn publish_is_confirmed_and_acknowledged() -> anyhow::Result<()> {
    let mut server = MockRelayServer::start().await?;
    let runtime = runtime(Arc::new(NoReconnect));
    let mut outputs = runtime.outputs();

    runtime.connect(server.url()).await?;
    wait_connected(&runtime).await?;

    let event = test_event(0x20, 1);
    let handle = runtime.publish(event.clone()).await?;
    let frame = tokio::time::timeout(TIMEOUT, server.recv()).await?.expect("EVENT frame");
    assert_eq!(published_event_id(&frame).as_deref(), Some(event.id.as_str()));

    // Write confirmation resolves after the frame reaches the wire.
    let outcome = tokio::time::timeout(TIMEOUT, handle.outcome()).await?;
    assert_eq!(outcome, WriteOutcome::Success);

    server.send(format!(r#"["OK","{}",true,"duplicate: already have this event"]"#, event.id));
    let ack = tokio::time::timeout(TIMEOUT, async {
        loop {
            match outputs.recv().await {
                Ok(Output::PublishAcknowledged { result }) => break result,
                Ok(_) => continue,
                Err(e) => panic!("output stream died: {e}"),
            }
        }
    })
    .await?;
    assert!(ack.accepted);
    assert_eq!(ack.code.as_deref(), Some("duplicate"));
    assert_eq!(ack.message, "already have this event");

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_server_drop() -> anyhow::Result<()> {
    let mut server = MockRelayServer::start().await?;
    let policy = FixedDelay { delay: Duration::from_millis(100), max_attempts: None };
    let runtime = runtime(Arc::new(policy));

    runtime.connect(server.url()).await?;
    wait_connected(&runtime).await?;
    runtime.subscribe(sub("live"), vec![Filter::new().kind(1)]).await?;
    let first = tokio::time::timeout(TIMEOUT, server.recv()).await?.expect("first REQ");
    assert_eq!(req_sub_id(&first).as_deref(), Some("live"));

    server.drop_connection();

    // The runtime must come back on its own and re-issue the subscription.
    let second = tokio::time::timeout(TIMEOUT, server.recv()).await?.expect("re-issued REQ");
    assert_eq!(req_sub_id(&second).as_deref(), Some("live"));
    wait_connected(&runtime).await?;

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn handshake_against_dead_port_fails() -> anyhow::Result<()> {
    // Bind-then-drop to find a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let runtime = runtime(Arc::new(NoReconnect));
    runtime.connect(format!("ws://{addr}")).await?;

    let mut state = runtime.state();
    let failed = tokio::time::timeout(
        TIMEOUT,
        state.wait_for(|s| matches!(s.connection, ConnectionSnapshot::Failed(_))),
    )
    .await??;
    assert!(matches!(failed.connection, ConnectionSnapshot::Failed(_)));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn session_query_returns_stored_events() -> anyhow::Result<()> {
    let mut server = MockRelayServer::start().await?;
    let runtime = Arc::new(runtime(Arc::new(NoReconnect)));
    let session = RelaySession::new(server.url(), Arc::clone(&runtime));

    let stored = vec![test_event(1, 1), test_event(2, 1)];
    let responder = {
        let stored = stored.clone();
        tokio::spawn(async move {
            loop {
                let Some(frame) = server.recv().await else { return server };
                if let Some(sub_id) = req_sub_id(&frame) {
                    for event in &stored {
                        let json = serde_json::to_string(event).expect("event json");
                        server.send(format!(r#"["EVENT","{sub_id}",{json}]"#));
                    }
                    server.send(format!(r#"["EOSE","{sub_id}"]"#));
                    return server;
                }
            }
        })
    };

    let result = session
        .query(vec![Filter::new().kind(1)], TIMEOUT, &EagerRetryConfig::default())
        .await;
    assert_eq!(result, RequestResult::Success(stored));

    responder.await?;
    runtime.shutdown().await;
    Ok(())
}
