use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::ThvError;

/// Uniform result record produced once per dispatched operation.
///
/// Serialized as a single JSON object: the `success` flag, an optional
/// `error` message and an arbitrary flattened payload. Never mutated after
/// it crosses the dispatch boundary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            payload: Map::new(),
        }
    }

    pub fn ok_with(payload: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            payload,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload: Map::new(),
        }
    }

    /// Attach a payload field, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_json(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }).to_string())
    }
}

impl From<ThvError> for OperationResult {
    fn from(err: ThvError) -> Self {
        OperationResult::fail(err.to_string())
    }
}
