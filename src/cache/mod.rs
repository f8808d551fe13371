// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync cache: the session's authoritative record of everything a
//! newly joined client needs replayed to reach parity with the rest of
//! the session.

pub mod actor;
pub mod asset;
pub mod merge;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use actor::SyncActor;
pub use asset::{AssetCreator, SyncAsset};

use crate::message::{Message, MessageId};

/// A connected user's own sync record, replayed to newly joined clients
/// alongside actors and assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUser {
    pub user_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// The session's cache of replayable state: actors, assets (and their
/// in-flight creators), and known users. Mutated only from the task
/// driving the session's app-facing phases.
#[derive(Debug, Default)]
pub struct SyncCache {
    pub actors: HashMap<String, SyncActor>,
    pub assets: HashMap<String, SyncAsset>,
    pub asset_creators: HashMap<MessageId, AssetCreator>,
    pub(crate) pending_asset_updates: HashMap<String, Message>,
    pub users: HashMap<String, SyncUser>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_user(&mut self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.users.entry(user_id.clone()).or_insert_with(|| SyncUser { user_id, properties: serde_json::json!({}) });
    }

    /// Builds the replay sequence: asset creators, then assets, then
    /// actors in parent-first order with each actor's animations and
    /// active media instances immediately following it.
    pub fn replay_messages(&self) -> Vec<Message> {
        let mut out = Vec::new();

        for creator in self.asset_creators.values() {
            out.push(creator.message.clone());
        }
        for asset in self.assets.values() {
            if let Some(update) = &asset.update {
                out.push(update.clone());
            }
        }
        for actor in self.actors_parent_first() {
            out.push(actor.initialization.clone());
            out.extend(actor.created_animations.iter().cloned());
            out.extend(actor.active_media_instances.iter().cloned());
        }

        out
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
