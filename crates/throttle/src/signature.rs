//! Flow request signatures.
//!
//! Two requests are duplicates when their signatures are equal: same flow
//! name and same arguments after canonicalization. Canonicalization sorts
//! object keys recursively at every depth and renders compact JSON, so
//! argument key order never distinguishes requests. Array order is
//! preserved; `["a","b"]` and `["b","a"]` are different requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical identity of one flow request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowSignature {
    pub flow_name: String,
    /// Compact JSON of the canonicalized arguments.
    pub canonical_args: String,
}

impl FlowSignature {
    pub fn new(flow_name: &str, args: &Value) -> Self {
        Self {
            flow_name: flow_name.to_string(),
            canonical_args: canonicalize(args).to_string(),
        }
    }
}

impl std::fmt::Display for FlowSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.flow_name, self.canonical_args)
    }
}

/// Rebuild a JSON value with object keys sorted at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a = FlowSignature::new("Collect", &json!({"path": "/etc", "depth": 2}));
        let b = FlowSignature::new("Collect", &json!({"depth": 2, "path": "/etc"}));
        assert_eq!(a, b);
    }

    #[test]
    fn nested_objects_are_canonicalized_too() {
        let a = FlowSignature::new("Collect", &json!({"opts": {"b": 1, "a": 2}}));
        let b = FlowSignature::new("Collect", &json!({"opts": {"a": 2, "b": 1}}));
        assert_eq!(a, b);
    }

    #[test]
    fn array_order_matters() {
        let a = FlowSignature::new("Collect", &json!({"paths": ["/a", "/b"]}));
        let b = FlowSignature::new("Collect", &json!({"paths": ["/b", "/a"]}));
        assert_ne!(a, b);
    }

    #[test]
    fn name_and_values_distinguish_requests() {
        let base = FlowSignature::new("Collect", &json!({"path": "/etc"}));
        assert_ne!(base, FlowSignature::new("Interrogate", &json!({"path": "/etc"})));
        assert_ne!(base, FlowSignature::new("Collect", &json!({"path": "/var"})));
    }

    #[test]
    fn display_is_name_then_compact_args() {
        let sig = FlowSignature::new("Collect", &json!({"b": 1, "a": 2}));
        assert_eq!(sig.to_string(), r#"Collect({"a":2,"b":1})"#);
    }
}
