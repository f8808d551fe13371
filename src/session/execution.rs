// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-side Execution: steady-state traffic from the app, routed
//! through the rules table and fanned out to clients (or correlated
//! back to whichever client's request it replies to). Runs until the
//! app transport closes or errors.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::protocol::{Incoming, ProtocolIo};
use crate::session::{AppOutbound, Session};

pub async fn run(
    io: &mut ProtocolIo,
    session: &Session,
    outbound_rx: &mut mpsc::UnboundedReceiver<AppOutbound>,
) -> Result<(), SyncError> {
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if io.check_timeouts() {
                    return Err(SyncError::ReplyTimeout("app transport timed out waiting for a reply".into()));
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(request) => io.send_message(request.message, request.reply, request.timeout),
                    None => return Err(SyncError::Transport("app outbound channel closed".into())),
                }
            }
            event = io.next_event() => {
                let Some(event) = event else { return Ok(()); };
                match io.ingest(event) {
                    Some(Incoming::Closed) => return Ok(()),
                    Some(Incoming::TransportError(reason)) => return Err(SyncError::Transport(reason)),
                    Some(Incoming::Dispatch(message)) => session.route_from_app(message).await,
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
