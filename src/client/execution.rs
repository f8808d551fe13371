// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side Execution: steady-state bidirectional forwarding between
//! the client's transport and the app, by way of the session's routing
//! and cache-mutating rules.

use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::error::SyncError;
use crate::protocol::{Incoming, ProtocolIo};
use crate::session::Session;

/// Runs until the client's transport closes or errors. Drains anything
/// queued while the client was still in Handshake/Sync first.
pub async fn run(io: &mut ProtocolIo, session: &Arc<Session>, client: &Arc<Client>) -> Result<(), SyncError> {
    for message in client.drain_all_queued() {
        io.send_fire_and_forget(message);
    }

    let mut tick = tokio::time::interval(Duration::from_millis(50));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if io.check_timeouts() {
                    return Err(SyncError::ReplyTimeout("client transport timed out waiting for a reply".into()));
                }
            }
            event = io.next_event() => {
                let Some(event) = event else { return Ok(()); };
                match io.ingest(event) {
                    Some(Incoming::Closed) => return Ok(()),
                    Some(Incoming::TransportError(reason)) => return Err(SyncError::Transport(reason)),
                    Some(Incoming::Dispatch(message)) => {
                        if let Some(forwarded) = Arc::clone(session).preprocess_from_client(client.id, message).await {
                            session.send_to_app(forwarded);
                        }
                    }
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
