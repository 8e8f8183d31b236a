//! JSON merge patch (RFC 7386) used when plugins return partial configs.

use serde_json::Value;

/// Merge `patch` into `target`.
///
/// Objects merge key by key, `null` removes a key, every other value
/// (arrays included) replaces the target wholesale.
pub fn merge_json(target: &mut Value, patch: Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch;
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Value::Object(target_map) = target else {
        return;
    };

    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(&key);
            continue;
        }
        match target_map.get_mut(&key) {
            Some(existing) => merge_json(existing, value),
            None => {
                let mut fresh = Value::Null;
                merge_json(&mut fresh, value);
                target_map.insert(key, fresh);
            },
        }
    }
}
