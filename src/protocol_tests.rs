use super::*;
use crate::message::Payload;
use crate::transport::channel_pair;
use std::time::Duration;

fn payload(kind: &str) -> Payload {
    Payload::new(kind, serde_json::json!({}))
}

#[tokio::test]
async fn reply_resolves_outstanding_waiter() {
    let (a, mut b) = channel_pair();
    let mut io = ProtocolIo::new(a);

    let (tx, rx) = oneshot::channel();
    let request = Message::new(payload("ping"));
    let request_id = request.id;
    io.send_message(request, Some(tx), None);

    let TransportEvent::Recv(received) = b.recv().await.expect("request delivered") else {
        panic!("expected Recv");
    };
    assert_eq!(received.id, request_id);
    b.send(Message::reply_to(request_id, payload("pong")));

    let event = io.next_event().await.expect("reply delivered");
    assert!(io.ingest(event).is_none(), "a reply should be fully consumed, not dispatched");

    let (value, message) = rx.await.expect("oneshot not dropped").expect("reply ok");
    assert_eq!(message.payload.kind, "pong");
    assert_eq!(value["type"], "pong");
}

#[tokio::test]
async fn expired_reply_rejects_with_timeout() {
    let (a, _b) = channel_pair();
    let mut io = ProtocolIo::new(a);

    let (tx, rx) = oneshot::channel();
    io.send_message(Message::new(payload("ping")), Some(tx), Some(Duration::from_millis(1)));
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(io.check_timeouts());
    assert!(!io.has_outstanding());
    match rx.await.expect("oneshot not dropped") {
        Err(SyncError::ReplyTimeout(_)) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_listening_rejects_outstanding_as_connection_closed() {
    let (a, _b) = channel_pair();
    let mut io = ProtocolIo::new(a);

    let (tx, rx) = oneshot::channel();
    io.send_message(Message::new(payload("ping")), Some(tx), None);
    io.stop_listening();

    match rx.await.expect("oneshot not dropped") {
        Err(SyncError::ConnectionClosed) => {}
        other => panic!("expected connection closed, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_reply_correlation_is_logged_and_dropped() {
    let (a, mut b) = channel_pair();
    let mut io = ProtocolIo::new(a);

    b.send(Message::reply_to(uuid::Uuid::new_v4(), payload("stray")));
    let event = io.next_event().await.expect("event delivered");
    assert!(io.ingest(event).is_none());
}

#[tokio::test]
async fn non_reply_message_is_dispatched() {
    let (a, mut b) = channel_pair();
    let mut io = ProtocolIo::new(a);

    b.send(Message::new(payload("actor-update")));
    let event = io.next_event().await.expect("event delivered");
    match io.ingest(event) {
        Some(Incoming::Dispatch(message)) => assert_eq!(message.payload.kind, "actor-update"),
        other => panic!("expected dispatch, got a non-dispatch outcome: {}", other.is_none()),
    }
}
