// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side Sync: replays the app's current world to a newly joined
//! client, then signals completion.

use serde_json::json;

use crate::client::ClientId;
use crate::message::{payload_type, Message, Payload};
use crate::protocol::ProtocolIo;
use crate::session::Session;

/// Replays connected peers, users, asset creators/assets, and actors
/// (parent-first, with their animations and media), then emits
/// `sync-complete`. Replay is session-driven and one-directional: any
/// message the client sends mid-sync is picked up at the top of the
/// next phase (Execution) rather than processed here.
pub async fn run(io: &mut ProtocolIo, session: &Session, self_id: ClientId) {
    {
        let clients = session.clients.read().await;
        let mut peers: Vec<_> = clients.values().filter(|c| c.id != self_id).collect();
        peers.sort_by_key(|c| c.order);
        for peer in peers {
            io.send_fire_and_forget(Message::new(Payload::new(
                payload_type::CLIENT_JOINED,
                json!({"clientId": peer.id, "userId": peer.user_id()}),
            )));
        }
    }

    {
        let cache = session.cache.read().await;
        for user in cache.users.values() {
            let body = serde_json::to_value(user).unwrap_or(json!({}));
            io.send_fire_and_forget(Message::new(Payload::new(payload_type::USER_JOINED, body)));
        }
        for message in cache.replay_messages() {
            io.send_fire_and_forget(message);
        }
    }

    io.send_fire_and_forget(Message::new(Payload::new(payload_type::SYNC_COMPLETE, json!({}))));
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
