// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deep-merge semantics used by the sync cache: objects recurse and
//! overlay key by key, arrays and primitives in the update replace the
//! corresponding value in the base entirely.

use serde_json::Value;

/// Merges `update` onto `base`. `update` wins on every conflict except
/// inside nested objects, where merging continues recursively instead of
/// replacing the whole object.
pub fn deep_merge(base: Value, update: Value) -> Value {
    match (base, update) {
        (Value::Object(mut base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, update) => update,
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
