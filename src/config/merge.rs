//! Deep merge for layered YAML configuration.
//!
//! Higher tier values override lower tier values field by field.
//! Arrays are replaced entirely, not concatenated.

use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use taskdeck::config::deep_merge;
///
/// let base = json!({ "server": { "port": 8080, "host": "127.0.0.1" } });
/// let overlay = json!({ "server": { "port": 9000 } });
/// let merged = deep_merge(base, overlay);
/// assert_eq!(merged, json!({ "server": { "port": 9000, "host": "127.0.0.1" } }));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_sections_merge_field_by_field() {
        let base = json!({
            "server": {"host": "127.0.0.1", "port": 8080},
            "auth": {"access_ttl_secs": 900}
        });
        let overlay = json!({"server": {"port": 9000}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({
                "server": {"host": "127.0.0.1", "port": 9000},
                "auth": {"access_ttl_secs": 900}
            })
        );
    }

    #[test]
    fn null_overlay_keeps_base() {
        let base = json!({"client": {"base_url": "http://a"}});
        let overlay = json!({"client": {"base_url": null}});
        assert_eq!(deep_merge(base.clone(), overlay), base);
    }

    #[test]
    fn later_tiers_win() {
        let merged = deep_merge_all(vec![
            json!({"server": {"port": 1}}),
            json!({"server": {"port": 2}}),
            json!({"server": {"host": "0.0.0.0"}}),
        ]);
        assert_eq!(merged, json!({"server": {"port": 2, "host": "0.0.0.0"}}));
    }
}
