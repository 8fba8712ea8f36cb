//! Dotted-path helpers over JSON values.
//!
//! A path that starts with `/` is a JSON pointer (RFC 6901) instead.

use serde_json::{Map, Value};

/// Looks up a dotted path inside a value.
///
/// Numeric segments index into arrays. An empty path returns the value
/// itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    if path.starts_with('/') {
        return value.pointer(path);
    }
    path.split('.')
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Looks up a dotted path inside an object map.
pub fn lookup_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(pointer) = path.strip_prefix('/') {
        return match pointer.split_once('/') {
            Some((head, rest)) => map
                .get(&unescape_token(head))
                .and_then(|value| value.pointer(&format!("/{rest}"))),
            None => map.get(&unescape_token(pointer)),
        };
    }
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => (path, ""),
    };
    map.get(head).and_then(|value| lookup(value, rest))
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Like [`lookup_in`], but an empty path yields the whole map.
pub fn resolve_in(map: &Map<String, Value>, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(Value::Object(map.clone()));
    }
    lookup_in(map, path).cloned()
}

/// Writes `value` at a dotted path, creating intermediate objects.
///
/// Sibling keys along the path are kept. A non-object intermediate is
/// replaced by an empty object.
pub fn set_in(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(inner) = child {
                set_in(inner, rest, value);
            }
        }
    }
}

/// Deep-merges `patch` into `base`.
///
/// Objects merge key by key. Any other patch value replaces the base value.
pub fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => merge_maps(base_map, patch_map),
        (slot, patch) => *slot = patch,
    }
}

/// Deep-merges `patch` into `base`, keeping keys the patch does not mention.
pub fn merge_maps(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match base.get_mut(&key) {
            Some(existing) => merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}
