//! Render-context merge rules.

use serde_json::{Map, Value};

/// Copy each of `keys` from the session into the payload when the payload
/// does not already carry it.
pub fn default_from_session(
    payload: &mut Map<String, Value>,
    session: &Map<String, Value>,
    keys: &[String],
) {
    for key in keys {
        if payload.contains_key(key) {
            continue;
        }
        if let Some(value) = session.get(key) {
            payload.insert(key.clone(), value.clone());
        }
    }
}

/// Write every declared static local into `target`, overwriting existing
/// values. Returns the keys that were already present.
pub fn merge_static_locals(
    target: &mut Map<String, Value>,
    locals: &Map<String, Value>,
) -> Vec<String> {
    let mut collisions = Vec::new();
    for (key, value) in locals {
        if target.insert(key.clone(), value.clone()).is_some() {
            collisions.push(key.clone());
        }
    }
    collisions
}
