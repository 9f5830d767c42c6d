//! JSON merge helpers for layered configuration.

use serde_json::{Map, Value};

/// Deep-merge overlay into base with no locked keys.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    merge_json_with_constraints(base, overlay, None);
}

/// Deep-merge overlay into base, skipping leaves that are pinned by `locks`.
///
/// Objects merge key by key; any other value replaces the base slot. A key
/// whose lock entry is a non-object value is frozen, including arrays.
pub(super) fn merge_json_with_constraints(
    base: &mut Value,
    overlay: &Value,
    locks: Option<&Value>,
) {
    let lock_map = match locks {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return,
    };
    if !(base.is_object() && overlay.is_object()) {
        if lock_map.is_none() {
            *base = overlay.clone();
        }
        return;
    }
    let (Some(base_map), Some(overlay_map)) = (base.as_object_mut(), overlay.as_object()) else {
        return;
    };
    for (key, value) in overlay_map {
        let lock = lock_map.and_then(|map| map.get(key));
        if matches!(lock, Some(lock) if !lock.is_object()) {
            continue;
        }
        match base_map.get_mut(key) {
            Some(existing) => merge_json_with_constraints(existing, value, lock),
            None if lock.is_some() => {
                let mut slot = Value::Object(Map::new());
                merge_json_with_constraints(&mut slot, value, lock);
                base_map.insert(key.clone(), slot);
            }
            None => {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}
