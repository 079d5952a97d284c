//! Dotted-path access over arbitrary JSON trees.
//!
//! Paths are dot separated (`address.city`). Numeric segments index into arrays for reads, and
//! the [`WILDCARD`] segment (`$`) applies the remainder of a path to every element of an array,
//! so `cars.$.wheels.$.placement` reaches the placement of every wheel of every car.

use serde_json::{Map, Value};

/// Path segment that maps over every element of an array.
pub const WILDCARD: &str = "$";

/// Splits a dotted path into its segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Reads the value at `path`, or `None` when any segment is missing.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

/// Writes `new` at `path`, creating (or replacing non-object) intermediate values with objects.
pub fn set(value: &mut Value, path: &str, new: Value) {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = value;
    for segment in parents {
        current = object_mut(current)
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }

    object_mut(current).insert(last.to_string(), new);
}

/// Removes the value at `path`. Missing paths are a no-op; `$` segments fan out over arrays.
pub fn unset(value: &mut Value, path: &str) {
    unset_segments(value, &segments(path));
}

/// Copies the value at `path` from `src` into `dst`, keeping its position in the tree.
///
/// Returns `true` when something was written. Nothing is written for missing paths, so the
/// destination never gains keys the source does not have. A `$` segment produces an array
/// aligned with the source array; repeated projections through the same array merge into the
/// same elements.
pub fn project(src: &Value, path: &str, dst: &mut Value) -> bool {
    project_segments(src, &segments(path), dst)
}

/// Flattens nested objects into dotted keys. Arrays and empty objects are kept as leaf values.
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();

    for (key, value) in map {
        match value {
            Value::Object(inner) if !inner.is_empty() => {
                for (inner_key, inner_value) in flatten(inner) {
                    flat.insert(format!("{key}.{inner_key}"), inner_value);
                }
            }
            _ => {
                flat.insert(key.clone(), value.clone());
            }
        }
    }

    flat
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }

    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn unset_segments(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if *head == WILDCARD {
        if let Value::Array(items) = value {
            for item in items {
                unset_segments(item, rest);
            }
        }
        return;
    }

    if rest.is_empty() {
        if let Value::Object(map) = value {
            map.remove(*head);
        }
        return;
    }

    let child = match value {
        Value::Object(map) => map.get_mut(*head),
        Value::Array(items) => head
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get_mut(index)),
        _ => None,
    };

    if let Some(child) = child {
        unset_segments(child, rest);
    }
}

fn project_segments(src: &Value, segments: &[&str], dst: &mut Value) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *dst = src.clone();
        return true;
    };

    if *head == WILDCARD {
        let Value::Array(items) = src else {
            return false;
        };

        // Reuse an array built by an earlier projection through the same field.
        let reused = matches!(dst, Value::Array(existing) if existing.len() == items.len());
        let mut slots = match dst {
            Value::Array(existing) if reused => std::mem::take(existing),
            _ => vec![Value::Null; items.len()],
        };

        let mut wrote = false;
        for (item, slot) in items.iter().zip(slots.iter_mut()) {
            wrote |= project_segments(item, rest, slot);
        }

        if wrote {
            for (item, slot) in items.iter().zip(slots.iter_mut()) {
                if slot.is_null() && item.is_object() {
                    *slot = Value::Object(Map::new());
                }
            }
        }

        if wrote || reused {
            *dst = Value::Array(slots);
        }

        return wrote;
    }

    let Some(child) = src.as_object().and_then(|map| map.get(*head)) else {
        return false;
    };

    let existing = dst.as_object_mut().and_then(|map| map.remove(*head));
    let existed = existing.is_some();
    let mut slot = existing.unwrap_or(Value::Null);

    let wrote = project_segments(child, rest, &mut slot);

    if wrote || existed {
        object_mut(dst).insert(head.to_string(), slot);
    }

    wrote
}
