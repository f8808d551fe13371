// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-side Handshake: the session's one handshake exchange with the
//! app transport, mirroring [`crate::client::handshake`] from the other
//! side of the wire.

use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::client::handshake::PROTOCOL_VERSION;
use crate::error::SyncError;
use crate::message::{payload_type, Message, Payload};
use crate::protocol::{Incoming, ProtocolIo};
use crate::session::{AppOutbound, Session};

/// Sends a handshake request to the app, then answers with
/// `handshake-reply` once the app's own reply arrives. Fails the same
/// ways a client handshake can: timeout, early close, or transport
/// error.
pub async fn run(
    io: &mut ProtocolIo,
    session: &Session,
    outbound_rx: &mut mpsc::UnboundedReceiver<AppOutbound>,
) -> Result<(), SyncError> {
    let (tx, rx) = oneshot::channel();
    let request = Message::new(Payload::new(
        payload_type::HANDSHAKE,
        json!({"protocolVersion": PROTOCOL_VERSION, "sessionId": session.session_id}),
    ));
    io.send_message(request, Some(tx), Some(session.config.handshake_timeout()));

    let mut tick = tokio::time::interval(Duration::from_millis(50));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if io.check_timeouts() {
                    return Err(SyncError::HandshakeFailed("app did not reply to handshake in time".into()));
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(request) => io.send_message(request.message, request.reply, request.timeout),
                    None => return Err(SyncError::HandshakeFailed("app outbound channel closed mid-handshake".into())),
                }
            }
            reply = &mut rx => {
                return match reply {
                    Ok(Ok(_)) => {
                        io.send_fire_and_forget(Message::new(Payload::new(
                            payload_type::HANDSHAKE_REPLY,
                            json!({"protocolVersion": PROTOCOL_VERSION}),
                        )));
                        Ok(())
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(SyncError::HandshakeFailed("handshake reply channel dropped".into())),
                };
            }
            event = io.next_event() => {
                let Some(event) = event else {
                    return Err(SyncError::HandshakeFailed("app transport closed mid-handshake".into()));
                };
                match io.ingest(event) {
                    Some(Incoming::Closed) => {
                        return Err(SyncError::HandshakeFailed("app closed before handshake completed".into()));
                    }
                    Some(Incoming::TransportError(reason)) => {
                        return Err(SyncError::Transport(reason));
                    }
                    Some(Incoming::Dispatch(message)) => {
                        tracing::debug!(kind = %message.payload.kind, "ignoring non-handshake message during session handshake");
                    }
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
