//! Last-write-wins deep merge of JSON values.
//!
//! Objects merge key by key and recurse into nested objects, arrays merge
//! index by index, and every other value in `source` replaces the value in
//! `target`.

use serde_json::Value;

/// Merge `source` into `target`, with `source` taking precedence.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(key) {
                    Some(existing) if is_container(existing) && is_container(value) => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        dst.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) => {
            for (i, value) in src.iter().enumerate() {
                match dst.get_mut(i) {
                    Some(existing) if is_container(existing) && is_container(value) => {
                        deep_merge(existing, value)
                    }
                    Some(existing) => *existing = value.clone(),
                    None => dst.push(value.clone()),
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Merge a sequence of layers, lowest precedence first.
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut merged = Value::Object(Default::default());
    for layer in layers {
        deep_merge(&mut merged, layer);
    }
    merged
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}
