// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-side Sync: absorbs the app's initial world-state dump.
//!
//! The wire traffic during this phase is shaped exactly like ordinary
//! Execution-phase traffic from the app (actor creates, asset creates,
//! updates), so it is routed through the same
//! [`Session::route_from_app`] cache-mutation-and-fan-out path; clients
//! that are already mid-handshake when the session reaches this phase
//! still receive it, queued until they themselves reach Execution. The
//! phase ends when the app sends `sync-complete`.

use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::message::payload_type;
use crate::protocol::{Incoming, ProtocolIo};
use crate::session::{AppOutbound, Session};

pub async fn run(
    io: &mut ProtocolIo,
    session: &Session,
    outbound_rx: &mut mpsc::UnboundedReceiver<AppOutbound>,
) -> Result<(), SyncError> {
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(request) => io.send_message(request.message, request.reply, request.timeout),
                    None => return Err(SyncError::Transport("app outbound channel closed".into())),
                }
            }
            event = io.next_event() => {
                let Some(event) = event else {
                    return Err(SyncError::Transport("app transport closed during sync".into()));
                };
                match io.ingest(event) {
                    Some(Incoming::Closed) => return Err(SyncError::Transport("app closed during sync".into())),
                    Some(Incoming::TransportError(reason)) => return Err(SyncError::Transport(reason)),
                    Some(Incoming::Dispatch(message)) => {
                        if message.payload.kind == payload_type::SYNC_COMPLETE {
                            return Ok(());
                        }
                        session.route_from_app(message).await;
                    }
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
