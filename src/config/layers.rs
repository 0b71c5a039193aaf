//! Layer merging
//!
//! Tables merge key by key; every other value, arrays included, is replaced
//! by the higher-precedence layer.

use serde_json::Value;

/// Merge `overlay` on top of `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in precedence order (last wins)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Convert a parsed TOML document into JSON so it can be layered.
///
/// Datetimes become their RFC 3339 text; non-finite floats become null.
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_keeps_sibling_keys() {
        let base = json!({"buildkite": {"org": "stile-education", "per_page": 30}});
        let overlay = json!({"buildkite": {"per_page": 100}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["buildkite"]["org"], "stile-education");
        assert_eq!(merged["buildkite"]["per_page"], 100);
    }

    #[test]
    fn test_scalar_replaces_table() {
        let merged = deep_merge(json!({"retry": {"max_attempts": 5}}), json!({"retry": 3}));
        assert_eq!(merged["retry"], 3);
    }

    #[test]
    fn test_merge_layers_precedence() {
        let merged = merge_layers(vec![
            json!({"manifest": {"architecture": ""}}),
            json!({"manifest": {"architecture": "IntelLinux", "manifest_name": "m.json"}}),
            json!({"manifest": {"architecture": "GravitonLinux"}}),
        ]);
        assert_eq!(merged["manifest"]["architecture"], "GravitonLinux");
        assert_eq!(merged["manifest"]["manifest_name"], "m.json");
    }

    #[test]
    fn test_merge_layers_empty() {
        assert_eq!(merge_layers(vec![]), Value::Null);
    }

    #[test]
    fn test_toml_to_json() {
        let toml: toml::Value = toml::from_str(
            r#"
            [manifest]
            manifest_name = "manifest.json"
            bfp_build_number = 42

            [retry]
            delay_seconds = 2
            "#,
        )
        .unwrap();
        let json = toml_to_json(toml);
        assert_eq!(json["manifest"]["bfp_build_number"], 42);
        assert_eq!(json["retry"]["delay_seconds"], 2);
    }
}
