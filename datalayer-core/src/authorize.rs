//! Field allow-list enforcement.

use tracing::trace;

/// Resolves `requested` field paths against a collection's `allow_list`.
///
/// - An empty allow-list means no restriction: `requested` is returned unchanged.
/// - A field listed verbatim is kept.
/// - A dotted field is kept when any of its ancestors is allowed (`address.city` under
///   `address`); ancestors are checked from the most specific one up.
/// - Otherwise every allowed entry nested below the field is emitted instead (`address`
///   requested with `address.city` allowed yields `address.city`), in allow-list order.
///
/// Anything else is dropped silently. The result never names a path that is not equal to or
/// nested under an allow-list entry.
pub fn authorize(requested: &[String], allow_list: &[String]) -> Vec<String> {
    if allow_list.is_empty() {
        return requested.to_vec();
    }

    let mut authorized: Vec<String> = Vec::with_capacity(requested.len());

    for field in requested {
        if allow_list.contains(field) || has_allowed_ancestor(field, allow_list) {
            push_unique(&mut authorized, field);
            continue;
        }

        let prefix = format!("{field}.");
        let nested = allow_list
            .iter()
            .filter(|allowed| allowed.starts_with(&prefix))
            .collect::<Vec<_>>();

        if nested.is_empty() {
            trace!(field = %field, "field dropped by allow-list");
        }

        for allowed in nested {
            push_unique(&mut authorized, allowed);
        }
    }

    authorized
}

fn push_unique(out: &mut Vec<String>, field: &str) {
    if !out.iter().any(|existing| existing == field) {
        out.push(field.to_string());
    }
}

fn has_allowed_ancestor(field: &str, allow_list: &[String]) -> bool {
    let mut current = field;

    while let Some(index) = current.rfind('.') {
        current = &current[..index];
        if allow_list.iter().any(|allowed| allowed == current) {
            return true;
        }
    }

    false
}
