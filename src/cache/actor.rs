// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor lifecycle: initialization (including the reserved-placeholder
//! overlay), updates, and the transform-space exclusion rule.

use serde_json::Value;

use crate::cache::merge::deep_merge;
use crate::cache::SyncCache;
use crate::message::{payload_type, Message};

/// A single actor's cached, replayable state.
#[derive(Debug, Clone)]
pub struct SyncActor {
    pub actor_id: String,
    pub initialization: Message,
    pub is_reserved: bool,
    pub created_animations: Vec<Message>,
    pub active_media_instances: Vec<Message>,
    pub active_interpolations: Vec<Message>,
    pub behavior: Option<String>,
    pub grabbed_by: Option<String>,
    /// Set once, from the reserved placeholder or the first real init.
    /// Invariant: never rewritten afterward.
    pub exclusive_to_user: Option<String>,
}

fn actor_id_of(message: &Message) -> Option<String> {
    message
        .payload
        .get("actor")
        .and_then(|a| a.get("id"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn parent_id_of(actor_value: &Value) -> Option<String> {
    actor_value.get("parentId").and_then(Value::as_str).map(str::to_owned)
}

impl SyncCache {
    /// Handles `x-reserve-actor` and `actor-create` (and any other
    /// initialization-shaped message carrying an `actor` payload).
    pub fn initialize_actor(&mut self, message: &Message) {
        let Some(actor_value) = message.payload.get("actor").cloned() else {
            tracing::debug!(kind = %message.payload.kind, "actor init message missing 'actor' field");
            return;
        };
        let Some(actor_id) = actor_id_of(message) else {
            tracing::debug!(kind = %message.payload.kind, "actor init message missing actor id");
            return;
        };
        let is_reserve_message = message.payload.kind == payload_type::RESERVE_ACTOR;

        if let Some(existing) = self.actors.get(&actor_id) {
            if existing.is_reserved {
                let reserved_actor = existing.initialization.payload.get("actor").cloned().unwrap_or(Value::Null);
                let merged_actor = deep_merge(reserved_actor, actor_value);
                let mut merged_message = message.clone();
                if let Some(obj) = merged_message.payload.body.as_object_mut() {
                    obj.insert("actor".to_owned(), merged_actor);
                }
                let exclusive_to_user = existing.exclusive_to_user.clone();
                if let Some(entry) = self.actors.get_mut(&actor_id) {
                    entry.initialization = merged_message;
                    entry.is_reserved = is_reserve_message;
                    entry.exclusive_to_user = exclusive_to_user;
                }
                return;
            }
            // Already fully initialized: a later init overwrites the stored
            // message but must not touch the inherited exclusivity.
            let exclusive_to_user = existing.exclusive_to_user.clone();
            if let Some(entry) = self.actors.get_mut(&actor_id) {
                entry.initialization = message.clone();
                entry.exclusive_to_user = exclusive_to_user;
            }
            return;
        }

        let parent_id = parent_id_of(&actor_value);
        let exclusive_to_user = parent_id
            .as_deref()
            .and_then(|pid| self.actors.get(pid))
            .and_then(|parent| parent.exclusive_to_user.clone())
            .or_else(|| actor_value.get("exclusiveToUser").and_then(Value::as_str).map(str::to_owned));

        self.actors.insert(
            actor_id.clone(),
            SyncActor {
                actor_id,
                initialization: message.clone(),
                is_reserved: is_reserve_message,
                created_animations: Vec::new(),
                active_media_instances: Vec::new(),
                active_interpolations: Vec::new(),
                behavior: None,
                grabbed_by: None,
                exclusive_to_user,
            },
        );
    }

    /// Handles `actor-update`: deep-merges the update onto the cached
    /// actor, then applies the transform-space exclusion rule so an
    /// app-space transform update never leaves a stale local transform
    /// (and vice versa) sitting in the cache.
    pub fn update_actor(&mut self, message: &Message) {
        let Some(actor_id) = message
            .payload
            .get("actorId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| actor_id_of(message))
        else {
            return;
        };
        let Some(existing) = self.actors.get(&actor_id) else {
            tracing::debug!(%actor_id, "actor-update for unknown actor");
            return;
        };
        let Some(update_actor_value) = message.payload.get("actor").cloned() else {
            return;
        };

        let current_actor = existing.initialization.payload.get("actor").cloned().unwrap_or(Value::Null);
        let mut merged = deep_merge(current_actor, update_actor_value.clone());
        apply_transform_space_exclusion(&mut merged, &update_actor_value);

        if let Some(entry) = self.actors.get_mut(&actor_id) {
            if let Some(obj) = entry.initialization.payload.body.as_object_mut() {
                obj.insert("actor".to_owned(), merged);
            }
        }
    }

    /// Actors in parent-first (root-first, breadth-by-parent) order.
    pub(crate) fn actors_parent_first(&self) -> Vec<&SyncActor> {
        use std::collections::{HashMap, VecDeque};

        let mut by_parent: HashMap<Option<String>, Vec<&SyncActor>> = HashMap::new();
        for actor in self.actors.values() {
            let actor_value = actor.initialization.payload.get("actor").cloned().unwrap_or(Value::Null);
            let parent = parent_id_of(&actor_value).filter(|pid| self.actors.contains_key(pid));
            by_parent.entry(parent).or_default().push(actor);
        }

        let mut ordered = Vec::with_capacity(self.actors.len());
        let mut queue: VecDeque<Option<String>> = VecDeque::new();
        queue.push_back(None);
        while let Some(key) = queue.pop_front() {
            if let Some(children) = by_parent.get(&key) {
                for child in children {
                    ordered.push(*child);
                    queue.push_back(Some(child.actor_id.clone()));
                }
            }
        }
        ordered
    }
}

/// An update naming an app-space transform clears any stale local
/// transform in the merged result, and vice versa: the two spaces are
/// mutually exclusive, so a merge must never leave both populated from
/// different generations of the actor's transform.
fn apply_transform_space_exclusion(merged_actor: &mut Value, update_actor_value: &Value) {
    let Some(update_transform) = update_actor_value.get("transform") else {
        return;
    };
    let Some(merged_transform) = merged_actor.get_mut("transform") else {
        return;
    };
    let Some(transform_obj) = merged_transform.as_object_mut() else {
        return;
    };

    if update_transform.get("app").is_some() {
        if let Some(local) = transform_obj.get_mut("local").and_then(Value::as_object_mut) {
            local.remove("position");
            local.remove("rotation");
        }
    } else if update_transform.get("local").is_some() {
        transform_obj.remove("app");
    }
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
