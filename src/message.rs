// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire envelope shared by every hop: app, session, and client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type MessageId = Uuid;

/// Reserved payload type strings the sync cache and rules table recognize.
pub mod payload_type {
    pub const RESERVE_ACTOR: &str = "x-reserve-actor";
    pub const CREATE_ACTOR: &str = "actor-create";
    pub const ACTOR_UPDATE: &str = "actor-update";
    pub const CREATE_ASSET: &str = "create-asset";
    pub const LOAD_ASSETS: &str = "load-assets";
    pub const ASSET_UPDATE: &str = "asset-update";
    pub const UNLOAD_ASSETS: &str = "unload-assets";
    pub const USER_LEFT: &str = "user-left";
    pub const USER_JOINED: &str = "user-joined";
    pub const CLIENT_JOINED: &str = "client-joined";
    pub const HANDSHAKE: &str = "handshake";
    pub const HANDSHAKE_REPLY: &str = "handshake-reply";
    pub const SYNC_COMPLETE: &str = "sync-complete";
}

/// The envelope exchanged on every hop of the multiplexer.
///
/// `id` is always present: unlike the wire format this was distilled from,
/// where an outgoing object may lack an id until send time, here the id is
/// minted eagerly at construction so `Message` is always a fully-formed
/// value, never a partially-built one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "replyToId", default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub payload: Payload,
}

/// The opaque, app-defined body of a message, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub body: Value,
}

impl Payload {
    pub fn new(kind: impl Into<String>, body: Value) -> Self {
        Self { kind: kind.into(), body }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

impl Message {
    /// Builds a fresh, unsolicited message (not a reply to anything).
    pub fn new(payload: Payload) -> Self {
        Self { id: Uuid::new_v4(), reply_to_id: None, payload }
    }

    /// Builds a reply correlated to `request_id`.
    pub fn reply_to(request_id: MessageId, payload: Payload) -> Self {
        Self { id: Uuid::new_v4(), reply_to_id: Some(request_id), payload }
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }
}
