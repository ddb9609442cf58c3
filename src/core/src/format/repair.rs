use serde_json::Value;

use super::CORRUPTION_SIGNATURE;

/// Find the first intact structured payload nested inside a corrupted result.
///
/// Walks depth first, skipping the root and any node whose serialized form
/// still carries the corruption signature. JSON encoded inside strings is
/// decoded and searched as well.
pub(super) fn recover_nested(raw: &Value) -> Option<Value> {
    match raw {
        Value::Object(map) => map.values().find_map(search),
        Value::Array(items) => items.iter().find_map(search),
        Value::String(text) => decode_structured(text).and_then(|inner| recover_nested(&inner)),
        _ => None,
    }
}

fn search(node: &Value) -> Option<Value> {
    match node {
        Value::Object(_) | Value::Array(_) => {
            if is_intact(node) {
                Some(node.clone())
            } else {
                recover_nested(node)
            }
        }
        Value::String(text) => {
            let decoded = decode_structured(text)?;
            search(&decoded)
        }
        _ => None,
    }
}

fn is_intact(node: &Value) -> bool {
    let empty = match node {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => true,
    };
    !empty && !node.to_string().contains(CORRUPTION_SIGNATURE)
}

fn decode_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}
