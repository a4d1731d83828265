//! Flow launch requests handed to the flow engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a launched flow, assigned by the flow engine.
pub type FlowId = String;

/// A request to start one flow on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Registered flow name, e.g. `"Interrogate"`.
    pub name: String,
    /// Flow arguments as a JSON object; empty when the flow takes none.
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

impl FlowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: empty_args(),
        }
    }

    pub fn with_args(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
