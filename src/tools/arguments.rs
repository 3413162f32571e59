//! Parsing and typed decoding of tool call arguments.

use rmcp::model::JsonObject;
use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};

/// Arguments of one tool call, normalized to an optional JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    object: Option<JsonObject>,
}

impl ToolArguments {
    /// Parse the raw argument text an agent produced.
    ///
    /// Blank text and `null` mean "no arguments". Anything else must be a JSON
    /// object, or a JSON string that itself contains one.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Normalize an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => Ok(Self { object: Some(map) }),
            serde_json::Value::String(raw) => Self::parse(&raw),
            other => Err(BridgeError::InvalidArgument(format!(
                "arguments must be a JSON object; got {other}"
            ))),
        }
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        self.object.as_ref()
    }

    pub fn into_object(self) -> Option<JsonObject> {
        self.object
    }

    /// Decode into a typed input struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        decode_arguments(self.object.clone())
    }
}

/// Decode protocol arguments into the typed input of a tool.
///
/// Missing arguments decode as an empty object, so structs whose fields are
/// all optional still succeed.
pub fn decode_arguments<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T> {
    let value = serde_json::Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(value)
        .map_err(|e| BridgeError::InvalidArgument(format!("invalid arguments: {e}")))
}
