// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives the two three-phase state machines (app-facing, client-facing)
//! to completion. Each lives on its own dedicated `tokio` task, so the
//! per-connection `ProtocolIo` and the `Session`/`Client` state it reads
//! never need a lock beyond what `Session` already holds for data shared
//! across clients.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::client::{self, Client, ClientId, ClientPhase};
use crate::error::SyncError;
use crate::protocol::ProtocolIo;
use crate::session::{execution, handshake, sync, AppOutbound, Session, SessionPhase};
use crate::transport::TransportHandle;

/// Runs the session's Handshake -> Sync -> Execution lifecycle against
/// the app transport. Whatever the outcome, every still-connected client
/// is closed along with it: the app is the session's sole source of
/// truth, so losing it invalidates every client relationship too.
pub(crate) async fn drive_app(
    session: &Arc<Session>,
    io: &mut ProtocolIo,
    outbound_rx: &mut mpsc::UnboundedReceiver<AppOutbound>,
) -> Result<(), SyncError> {
    let result = run_app_phases(session, io, outbound_rx).await;

    io.stop_listening();
    session.set_phase(SessionPhase::Closed);
    for client in session.clients.read().await.values() {
        client.transport.close();
    }

    result
}

async fn run_app_phases(
    session: &Arc<Session>,
    io: &mut ProtocolIo,
    outbound_rx: &mut mpsc::UnboundedReceiver<AppOutbound>,
) -> Result<(), SyncError> {
    handshake::run(io, session, outbound_rx).await?;
    session.set_phase(SessionPhase::Sync);

    sync::run(io, session, outbound_rx).await?;
    session.set_phase(SessionPhase::Execution);

    execution::run(io, session, outbound_rx).await
}

/// Runs one client's Handshake -> Sync -> Execution lifecycle against
/// its own transport, then tells the session to forget it. Spawned once
/// per client by [`Session::add_client`]; never returns early on its
/// own — only transport close/error or a phase failure ends it.
pub(crate) async fn run_client(session: Arc<Session>, client: Arc<Client>, handle: TransportHandle) {
    let mut io =
        ProtocolIo::with_middleware(handle, session.client_send_middleware.clone(), session.client_recv_middleware.clone());

    let result = run_client_phases(&session, &mut io, &client).await;

    io.stop_listening();
    client.set_phase(ClientPhase::Closed);
    if let Err(err) = &result {
        tracing::debug!(client_id = %client.id, error = %err, "client disconnected");
    }

    session.remove_client(client.id).await;
}

async fn run_client_phases(session: &Arc<Session>, io: &mut ProtocolIo, client: &Arc<Client>) -> Result<(), SyncError> {
    let user_id = client::handshake::run(io, session).await?;
    client.set_user_id(user_id.clone());
    session.cache.write().await.register_user(user_id);
    client.set_phase(ClientPhase::Sync);

    client::sync::run(io, session, client.id).await;
    client.set_phase(ClientPhase::Execution);

    client::execution::run(io, session, client).await
}

/// Non-busy-wait predicate: resolves once `client_id` has reached
/// Execution or later (Closed), or is gone from the session entirely.
pub async fn wait_for_execution_or_closed(session: &Session, client_id: ClientId) {
    let mut phase_rx = {
        let clients = session.clients.read().await;
        match clients.get(&client_id) {
            Some(client) => client.subscribe_phase(),
            None => return,
        }
    };
    loop {
        if *phase_rx.borrow() >= ClientPhase::Execution {
            return;
        }
        if phase_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
#[path = "multiplexer_tests.rs"]
mod tests;
