// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side Handshake: the session asks the client for its user id
//! and protocol version before anything else happens.

use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::message::{payload_type, Message, Payload};
use crate::protocol::{Incoming, ProtocolIo};
use crate::session::Session;

/// Protocol version this implementation speaks. Bumped only on a
/// breaking change to the handshake payload shape.
pub const PROTOCOL_VERSION: u32 = 1;

/// Runs the handshake to completion, returning the client's user id.
pub async fn run(io: &mut ProtocolIo, session: &Session) -> Result<String, SyncError> {
    let (tx, rx) = oneshot::channel();
    let request = Message::new(Payload::new(payload_type::HANDSHAKE, json!({"protocolVersion": PROTOCOL_VERSION})));
    io.send_message(request, Some(tx), Some(session.config.handshake_timeout()));

    let mut tick = tokio::time::interval(Duration::from_millis(50));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if io.check_timeouts() {
                    return Err(SyncError::HandshakeFailed("timed out waiting for handshake reply".into()));
                }
            }
            reply = &mut rx => {
                return match reply {
                    Ok(Ok((value, _message))) => {
                        value.get("user_id")
                            .or_else(|| value.get("userId"))
                            .and_then(|v| v.as_str())
                            .map(str::to_owned)
                            .ok_or_else(|| SyncError::HandshakeFailed("handshake reply missing user id".into()))
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(SyncError::HandshakeFailed("handshake reply channel dropped".into())),
                };
            }
            event = io.next_event() => {
                let Some(event) = event else {
                    return Err(SyncError::HandshakeFailed("transport closed mid-handshake".into()));
                };
                match io.ingest(event) {
                    Some(Incoming::Closed) => {
                        return Err(SyncError::HandshakeFailed("client closed before handshake completed".into()));
                    }
                    Some(Incoming::TransportError(reason)) => {
                        return Err(SyncError::Transport(reason));
                    }
                    Some(Incoming::Dispatch(message)) => {
                        tracing::debug!(kind = %message.payload.kind, "ignoring non-handshake message during handshake");
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
