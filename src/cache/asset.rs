// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asset creator/asset lifecycle: creation requests, buffered updates
//! that race ahead of the app's creation reply, and container unload.

use serde_json::Value;

use crate::cache::merge::deep_merge;
use crate::cache::SyncCache;
use crate::message::{payload_type, Message, MessageId};

/// A `create-asset` or `load-assets` request, cached keyed by its own
/// message id until the app's reply resolves it into one or more
/// [`SyncAsset`] entries.
#[derive(Debug, Clone)]
pub struct AssetCreator {
    pub message: Message,
    pub container_id: Option<String>,
}

/// A fully created, replayable asset.
#[derive(Debug, Clone)]
pub struct SyncAsset {
    pub id: String,
    pub duration: Option<f64>,
    pub creator_message_id: MessageId,
    pub update: Option<Message>,
}

fn asset_id_of(message: &Message) -> Option<String> {
    message
        .payload
        .get("assetId")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| message.payload.get("asset").and_then(|a| a.get("id")).and_then(Value::as_str).map(str::to_owned))
}

fn merge_asset_field(target: &mut Message, incoming: &Message) {
    let Some(incoming_asset) = incoming.payload.get("asset").cloned() else {
        return;
    };
    let current = target.payload.get("asset").cloned().unwrap_or(Value::Null);
    let merged = deep_merge(current, incoming_asset);
    if let Some(obj) = target.payload.body.as_object_mut() {
        obj.insert("asset".to_owned(), merged);
    }
}

impl SyncCache {
    /// Handles `create-asset` / `load-assets` arriving from a client on
    /// its way to the app: records the creating message keyed by its own
    /// id so the eventual app reply can be matched back to it.
    pub fn record_asset_creator(&mut self, message: &Message) {
        let container_id = message.payload.get("containerId").and_then(Value::as_str).map(str::to_owned);
        self.asset_creators.insert(message.id, AssetCreator { message: message.clone(), container_id });
    }

    pub fn has_asset_creator(&self, id: &MessageId) -> bool {
        self.asset_creators.contains_key(id)
    }

    /// Handles `asset-update`: merges into the still-pending creator's
    /// definition, an already-created asset's buffered update, or stages
    /// the update for an asset the app hasn't confirmed yet.
    pub fn apply_asset_update(&mut self, message: &Message) {
        let Some(asset_id) = asset_id_of(message) else {
            return;
        };

        if let Some(creator_id) = self.assets.get(&asset_id).map(|a| a.creator_message_id) {
            if self.asset_creators.get(&creator_id).is_some_and(|c| c.message.payload.kind == payload_type::CREATE_ASSET) {
                if let Some(creator) = self.asset_creators.get_mut(&creator_id) {
                    merge_asset_field(&mut creator.message, message);
                }
                return;
            }
            if let Some(asset) = self.assets.get_mut(&asset_id) {
                match &mut asset.update {
                    Some(buffered) => merge_asset_field(buffered, message),
                    None => asset.update = Some(message.clone()),
                }
            }
            return;
        }

        match self.pending_asset_updates.get_mut(&asset_id) {
            Some(buffered) => merge_asset_field(buffered, message),
            None => {
                self.pending_asset_updates.insert(asset_id, message.clone());
            }
        }
    }

    /// Handles the app's reply to a `create-asset`/`load-assets` request:
    /// materializes the [`SyncAsset`], folding in any update that raced
    /// ahead of the creation reply.
    pub fn complete_asset_creation(&mut self, creator_id: MessageId, reply: &Message) {
        if !self.asset_creators.contains_key(&creator_id) {
            return;
        }
        let Some(asset_id) = reply.payload.get("id").and_then(Value::as_str).map(str::to_owned) else {
            return;
        };
        let duration = reply.payload.get("duration").and_then(Value::as_f64);

        let mut synced = SyncAsset { id: asset_id.clone(), duration, creator_message_id: creator_id, update: None };

        if let Some(buffered) = self.pending_asset_updates.remove(&asset_id) {
            let is_create_asset = self
                .asset_creators
                .get(&creator_id)
                .is_some_and(|c| c.message.payload.kind == payload_type::CREATE_ASSET);
            if is_create_asset {
                if let Some(creator) = self.asset_creators.get_mut(&creator_id) {
                    merge_asset_field(&mut creator.message, &buffered);
                }
            } else {
                synced.update = Some(buffered);
            }
        }

        self.assets.insert(asset_id, synced);
    }

    /// Handles `unload-assets`: drops every creator and asset belonging
    /// to the named container.
    pub fn unload_assets(&mut self, message: &Message) {
        let Some(container_id) = message.payload.get("containerId").and_then(Value::as_str) else {
            return;
        };

        let dropped: Vec<MessageId> = self
            .asset_creators
            .iter()
            .filter(|(_, creator)| creator.container_id.as_deref() == Some(container_id))
            .map(|(id, _)| *id)
            .collect();

        for id in &dropped {
            self.asset_creators.remove(id);
        }
        self.assets.retain(|_, asset| !dropped.contains(&asset.creator_message_id));
    }
}

#[cfg(test)]
#[path = "asset_tests.rs"]
mod tests;
