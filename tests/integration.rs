// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end multi-client scenarios, driving `Session` the way a real
//! caller would: wire up an app transport and however many client
//! transports, then observe the cache, fan-out, and authoritative
//! election from the outside.

use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use uuid::Uuid;

use syncmux::client::ClientPhase;
use syncmux::message::{payload_type, Message, Payload};
use syncmux::protocol::ProtocolIo;
use syncmux::transport::{channel_pair, TransportEvent, TransportHandle};
use syncmux::{Session, SessionConfig};

/// Answers the session's app-facing handshake and immediately signals
/// `sync-complete` with no initial world dump, then hands the transport
/// back so the test can keep driving it as the app.
async fn start_app(mut app: TransportHandle) -> TransportHandle {
    let TransportEvent::Recv(handshake) = app.recv().await.expect("session sends handshake") else {
        panic!("expected handshake request");
    };
    assert_eq!(handshake.payload.kind, payload_type::HANDSHAKE);
    app.send(Message::reply_to(handshake.id, Payload::new("handshake-reply", json!({"protocolVersion": 1}))));

    let TransportEvent::Recv(reply_ack) = app.recv().await.expect("session acks handshake") else {
        panic!("expected handshake-reply forwarded back");
    };
    assert_eq!(reply_ack.payload.kind, payload_type::HANDSHAKE_REPLY);

    app.send(Message::new(Payload::new(payload_type::SYNC_COMPLETE, json!({}))));
    app
}

/// Drives one client through Handshake and Sync, leaving it ready to
/// exchange Execution-phase traffic freely.
async fn join_client(session: &std::sync::Arc<Session>, user_id: &str) -> (Uuid, TransportHandle) {
    let (client_handle, mut client_peer) = channel_pair();
    let client_id = session.add_client(client_handle).await;

    let TransportEvent::Recv(handshake) = client_peer.recv().await.expect("handshake sent to client") else {
        panic!("expected handshake request");
    };
    client_peer.send(Message::reply_to(
        handshake.id,
        Payload::new("handshake-reply", json!({"userId": user_id})),
    ));

    loop {
        match client_peer.recv().await.expect("sync traffic") {
            TransportEvent::Recv(message) if message.payload.kind == payload_type::SYNC_COMPLETE => break,
            TransportEvent::Recv(_) => {}
            other => panic!("unexpected event while syncing client: {other:?}"),
        }
    }

    (client_id, client_peer)
}

#[tokio::test]
async fn first_client_is_elected_authoritative_and_receives_broadcasts() {
    let (app_handle, app) = channel_pair();
    let session = Session::new("session-1", SessionConfig::default(), app_handle);

    let session_task = {
        let session = std::sync::Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };
    let mut app = start_app(app).await;

    let (client_id, mut client) = join_client(&session, "u1").await;
    assert_eq!(
        session.clients.read().await.get(&client_id).expect("client present").phase(),
        ClientPhase::Execution
    );
    assert!(session.clients.read().await.get(&client_id).expect("client present").is_authoritative());

    app.send(Message::new(Payload::new(payload_type::CREATE_ACTOR, json!({"actor": {"id": "a1"}}))));
    match client.recv().await {
        Some(TransportEvent::Recv(message)) => assert_eq!(message.payload.kind, payload_type::CREATE_ACTOR),
        other => panic!("expected the actor create forwarded to the client, got {other:?}"),
    }

    client.close();
    app.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), session_task).await;
}

#[tokio::test]
async fn authoritative_handoff_on_departure() {
    let (app_handle, app) = channel_pair();
    let session = Session::new("session-2", SessionConfig::default(), app_handle);

    let session_task = {
        let session = std::sync::Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };
    let mut app = start_app(app).await;

    let (c1, mut c1_peer) = join_client(&session, "u1").await;
    let (c2, _c2_peer) = join_client(&session, "u2").await;

    assert!(session.clients.read().await.get(&c1).expect("c1 present").is_authoritative());
    assert!(!session.clients.read().await.get(&c2).expect("c2 present").is_authoritative());

    c1_peer.close();

    // Authoritative handoff happens on `Session::remove_client`, which the
    // departing client's own task calls once its protocol stack unwinds;
    // poll briefly rather than assume a fixed number of scheduler ticks.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if session.clients.read().await.get(&c1).is_none() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("client was never removed after its transport closed");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.clients.read().await.get(&c2).expect("c2 present").is_authoritative());

    app.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), session_task).await;
}

#[tokio::test]
async fn late_joining_client_is_synced_from_the_cache_not_the_app() {
    let (app_handle, app) = channel_pair();
    let session = Session::new("session-3", SessionConfig::default(), app_handle);

    let session_task = {
        let session = std::sync::Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };
    let mut app = start_app(app).await;

    app.send(Message::new(Payload::new(payload_type::CREATE_ACTOR, json!({"actor": {"id": "a1", "name": "lamp"}}))));
    // Give the session task a moment to absorb the actor into its cache
    // before a second client arrives expecting to see it replayed.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_client_id, client) = join_client(&session, "u1").await;
    assert!(session.cache.read().await.actors.contains_key("a1"));

    client.close();
    app.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), session_task).await;
}

#[tokio::test]
async fn reply_timeout_on_session_handshake_is_fatal_to_the_session() {
    let (app_handle, _app) = channel_pair();
    let mut config = SessionConfig::default();
    config.handshake_timeout = Duration::from_millis(20);
    let session = Session::new("session-4", config, app_handle);

    let result = session.run().await;
    assert!(result.is_err(), "a session whose app never answers the handshake must fail, not hang");
}

#[tokio::test]
async fn protocol_io_reply_timeout_closes_the_transport() {
    let (a, _b) = channel_pair();
    let mut io = ProtocolIo::new(a);
    let (tx, rx) = oneshot::channel();

    io.send_message(
        Message::new(Payload::new("ping", json!({}))),
        Some(tx),
        Some(Duration::from_millis(5)),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(io.check_timeouts());
    assert!(io.transport().is_closed(), "a fatal reply timeout must close the transport, not just reject the reply");

    let outcome = rx.await.expect("reply channel not dropped");
    assert!(outcome.is_err());
}

#[tokio::test]
async fn client_request_is_forwarded_to_the_app_and_the_reply_routed_back() {
    let (app_handle, app) = channel_pair();
    let session = Session::new("session-5", SessionConfig::default(), app_handle);

    let session_task = {
        let session = std::sync::Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };
    let mut app = start_app(app).await;

    let (_client_id, mut client) = join_client(&session, "u1").await;

    client.send(Message::new(Payload::new(payload_type::CREATE_ASSET, json!({"definition": {"name": "clip"}}))));

    let TransportEvent::Recv(request) = app.recv().await.expect("request forwarded to the app") else {
        panic!("expected the client's request forwarded to the app");
    };
    assert_eq!(request.payload.kind, payload_type::CREATE_ASSET);

    app.send(Message::reply_to(request.id, Payload::new("create-asset-reply", json!({"id": "asset-1"}))));

    match client.recv().await {
        Some(TransportEvent::Recv(reply)) => assert_eq!(reply.payload.kind, "create-asset-reply"),
        other => panic!("expected the app's reply routed back to the originating client, got {other:?}"),
    }
    assert!(session.cache.read().await.assets.contains_key("asset-1"));

    client.close();
    app.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), session_task).await;
}

#[tokio::test]
async fn client_request_the_app_never_answers_times_out_and_closes_the_session() {
    let (app_handle, app) = channel_pair();
    let mut config = SessionConfig::default();
    config.default_reply_timeout = Duration::from_millis(30);
    let session = Session::new("session-6", config, app_handle);

    let session_task = {
        let session = std::sync::Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };
    let mut app = start_app(app).await;

    let (_client_id, mut client) = join_client(&session, "u1").await;
    client.send(Message::new(Payload::new(payload_type::CREATE_ASSET, json!({"definition": {"name": "clip"}}))));

    let TransportEvent::Recv(request) = app.recv().await.expect("request forwarded to the app") else {
        panic!("expected the client's request forwarded to the app");
    };
    assert_eq!(request.payload.kind, payload_type::CREATE_ASSET);

    // The app never replies; the reply timeout must eventually tear the
    // whole session down rather than leak the correlation forever.
    let result = tokio::time::timeout(Duration::from_secs(2), session_task)
        .await
        .expect("session must not hang past the reply timeout")
        .expect("task does not panic");
    assert!(result.is_err(), "an unanswered forwarded request must be fatal to the session");

    client.close();
}
