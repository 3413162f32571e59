//! Tool descriptors and the JSON-schema subset they are described with.
//!
//! Wire schemas are plain JSON objects. They are translated into the closed
//! [`SchemaShape`] tree and back; `to_wire(from_wire(x)) == x` holds for every
//! schema built from the supported keywords (`type`, `description`, `enum`,
//! `properties`, `required`, `items`, `anyOf`). Other keywords are dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// A schema node: an optional description plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub description: Option<String>,
    pub shape: SchemaShape,
}

/// The closed set of schema shapes the bridge understands.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaShape {
    String { enum_values: Option<Vec<String>> },
    Number,
    Integer,
    Boolean,
    Null,
    Object {
        properties: Option<BTreeMap<String, Schema>>,
        required: Option<Vec<String>>,
    },
    Array { items: Box<Schema> },
    AnyOf(Vec<Schema>),
}

impl SchemaShape {
    /// The wire `type` name, if this shape has one.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::String { .. } => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Null => Some("null"),
            Self::Object { .. } => Some("object"),
            Self::Array { .. } => Some("array"),
            Self::AnyOf(_) => None,
        }
    }
}

impl Schema {
    fn new(shape: SchemaShape) -> Self {
        Self {
            description: None,
            shape,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaShape::String { enum_values: None })
    }

    pub fn string_enum<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SchemaShape::String {
            enum_values: Some(values.into_iter().map(Into::into).collect()),
        })
    }

    pub fn number() -> Self {
        Self::new(SchemaShape::Number)
    }

    pub fn integer() -> Self {
        Self::new(SchemaShape::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaShape::Boolean)
    }

    pub fn null() -> Self {
        Self::new(SchemaShape::Null)
    }

    /// An object schema with no properties yet; add them with [`Schema::property`].
    pub fn object() -> Self {
        Self::new(SchemaShape::Object {
            properties: Some(BTreeMap::new()),
            required: None,
        })
    }

    pub fn array(items: Schema) -> Self {
        Self::new(SchemaShape::Array {
            items: Box::new(items),
        })
    }

    pub fn any_of(branches: Vec<Schema>) -> Self {
        Self::new(SchemaShape::AnyOf(branches))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a property to an object schema. No-op on other shapes.
    pub fn property(mut self, name: impl Into<String>, schema: Schema, required: bool) -> Self {
        if let SchemaShape::Object {
            properties,
            required: required_list,
        } = &mut self.shape
        {
            let name = name.into();
            if required {
                required_list.get_or_insert_with(Vec::new).push(name.clone());
            }
            properties
                .get_or_insert_with(BTreeMap::new)
                .insert(name, schema);
        }
        self
    }

    /// Translate a wire schema node.
    pub fn from_wire(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_object(map),
            _ => Err(BridgeError::Schema("schema is not a valid object".into())),
        }
    }

    /// Translate a wire schema object.
    pub fn from_object(map: &JsonObject) -> Result<Self> {
        let description = map
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned);

        if let Some(Value::Array(branches)) = map.get("anyOf") {
            // An empty anyOf only stands on its own when no type backs it.
            if branches.is_empty() && !map.contains_key("type") {
                return Ok(Self {
                    description,
                    shape: SchemaShape::AnyOf(Vec::new()),
                });
            }
            if !branches.is_empty() {
                let branches = branches
                    .iter()
                    .map(any_of_branch)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| BridgeError::Schema(format!("failed to convert anyOf option: {e}")))?;
                return Ok(Self {
                    description,
                    shape: SchemaShape::AnyOf(branches),
                });
            }
        }

        let type_name = map.get("type").and_then(Value::as_str).ok_or_else(|| {
            BridgeError::Schema("property type is missing or not a string".into())
        })?;

        let shape = match type_name {
            "string" => SchemaShape::String {
                enum_values: map.get("enum").map(string_enum).transpose()?,
            },
            "number" => SchemaShape::Number,
            "integer" => SchemaShape::Integer,
            "boolean" => SchemaShape::Boolean,
            "null" => SchemaShape::Null,
            "object" => object_shape(map)?,
            "array" => {
                let items = match map.get("items") {
                    Some(Value::Object(items)) => Self::from_object(items)?,
                    _ => {
                        return Err(BridgeError::Schema(
                            "array items schema is missing or invalid".into(),
                        ))
                    }
                };
                SchemaShape::Array {
                    items: Box::new(items),
                }
            }
            other => {
                return Err(BridgeError::Schema(format!(
                    "unsupported property type: {other}"
                )))
            }
        };

        Ok(Self { description, shape })
    }

    /// Render this node back to its wire form.
    pub fn to_wire(&self) -> Value {
        Value::Object(self.to_object())
    }

    pub fn to_object(&self) -> JsonObject {
        let mut map = JsonObject::new();
        if let Some(type_name) = self.shape.type_name() {
            map.insert("type".into(), Value::String(type_name.into()));
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        match &self.shape {
            SchemaShape::String {
                enum_values: Some(values),
            } => {
                map.insert(
                    "enum".into(),
                    Value::Array(values.iter().cloned().map(Value::String).collect()),
                );
            }
            SchemaShape::Object {
                properties,
                required,
            } => {
                if let Some(properties) = properties {
                    let rendered = properties
                        .iter()
                        .map(|(name, schema)| (name.clone(), schema.to_wire()))
                        .collect::<JsonObject>();
                    map.insert("properties".into(), Value::Object(rendered));
                }
                if let Some(required) = required {
                    map.insert(
                        "required".into(),
                        Value::Array(required.iter().cloned().map(Value::String).collect()),
                    );
                }
            }
            SchemaShape::Array { items } => {
                map.insert("items".into(), items.to_wire());
            }
            SchemaShape::AnyOf(branches) => {
                map.insert(
                    "anyOf".into(),
                    Value::Array(branches.iter().map(Schema::to_wire).collect()),
                );
            }
            _ => {}
        }
        map
    }
}

fn any_of_branch(branch: &Value) -> Result<Schema> {
    match branch {
        Value::Object(map) => Schema::from_object(map),
        Value::String(type_name) => {
            let mut map = JsonObject::new();
            map.insert("type".into(), Value::String(type_name.clone()));
            Schema::from_object(&map)
        }
        other => Err(BridgeError::Schema(format!(
            "unexpected anyOf option type: {other}"
        ))),
    }
}

fn string_enum(value: &Value) -> Result<Vec<String>> {
    let Value::Array(entries) = value else {
        return Err(BridgeError::Schema("enum is not an array".into()));
    };
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(s) => Ok(s.clone()),
            other => Err(BridgeError::Schema(format!(
                "unexpected enum value type: {other}"
            ))),
        })
        .collect()
}

fn object_shape(map: &JsonObject) -> Result<SchemaShape> {
    let properties = match map.get("properties") {
        None => None,
        Some(Value::Object(props)) => {
            let mut converted = BTreeMap::new();
            for (name, value) in props {
                let Value::Object(prop) = value else {
                    return Err(BridgeError::Schema(format!(
                        "sub-property '{name}' is not a valid object"
                    )));
                };
                let schema = Schema::from_object(prop).map_err(|e| {
                    BridgeError::Schema(format!("failed to convert sub-property '{name}': {e}"))
                })?;
                converted.insert(name.clone(), schema);
            }
            Some(converted)
        }
        Some(_) => return Err(BridgeError::Schema("properties is not a valid object".into())),
    };

    let required = match map.get("required") {
        None => None,
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(str::to_owned).ok_or_else(|| {
                        BridgeError::Schema("required field is not a string".into())
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => return Err(BridgeError::Schema("required is not an array".into())),
    };

    Ok(SchemaShape::Object {
        properties,
        required,
    })
}

/// The bridge's canonical description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub output_schema: Option<Schema>,
}

impl ToolDescriptor {
    /// Translate a tool as listed by a backend. The input schema must be an object.
    pub fn from_wire(tool: &Tool) -> Result<Self> {
        match tool.input_schema.get("type").and_then(Value::as_str) {
            Some("object") => {}
            other => {
                return Err(BridgeError::Schema(format!(
                    "unsupported schema type: {} (only 'object' is supported)",
                    other.unwrap_or("<missing>")
                )))
            }
        }
        let input_schema = Schema::from_object(&tool.input_schema)?;
        let output_schema = tool
            .output_schema
            .as_deref()
            .map(Schema::from_object)
            .transpose()
            .map_err(|e| BridgeError::Schema(format!("output schema: {e}")))?;

        Ok(Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .as_deref()
                .map(str::to_owned)
                .unwrap_or_default(),
            input_schema,
            output_schema,
        })
    }

    /// Render as an rmcp tool definition.
    pub fn to_wire(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(self.input_schema.to_object()),
        );
        tool.output_schema = self
            .output_schema
            .as_ref()
            .map(|schema| Arc::new(schema.to_object()));
        tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture should be an object, got {other}"),
        }
    }

    #[test]
    fn round_trips_every_supported_construct() {
        let wire = json!({
            "type": "object",
            "description": "search request",
            "properties": {
                "query": { "type": "string", "description": "terms" },
                "mode": { "type": "string", "enum": ["fast", "exact"] },
                "limit": { "type": "integer" },
                "boost": { "type": "number" },
                "strict": { "type": "boolean" },
                "cursor": { "anyOf": [{ "type": "string" }, { "type": "null" }], "description": "page" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "filter": {
                    "type": "object",
                    "properties": {
                        "owner": { "type": "string" },
                        "ranges": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": { "from": { "type": "integer" } },
                                "required": ["from"]
                            }
                        }
                    },
                    "required": ["owner"]
                }
            },
            "required": ["query", "mode"]
        });

        let schema = Schema::from_wire(&wire).expect("schema should translate");
        assert_eq!(schema.to_wire(), wire);
    }

    #[test]
    fn any_of_takes_precedence_over_type() {
        let schema = Schema::from_wire(&json!({
            "type": "string",
            "description": "either",
            "anyOf": [{ "type": "integer" }, { "type": "boolean" }]
        }))
        .expect("anyOf should translate");

        assert_eq!(schema.description.as_deref(), Some("either"));
        assert_eq!(
            schema.shape,
            SchemaShape::AnyOf(vec![Schema::integer(), Schema::boolean()])
        );
    }

    #[test]
    fn empty_any_of_round_trips() {
        let schema = Schema::any_of(Vec::new()).with_description("nothing yet");
        let wire = schema.to_wire();
        assert_eq!(wire, json!({ "anyOf": [], "description": "nothing yet" }));
        assert_eq!(Schema::from_wire(&wire).expect("empty anyOf should translate"), schema);
    }

    #[test]
    fn empty_any_of_defers_to_type() {
        let schema = Schema::from_wire(&json!({ "anyOf": [], "type": "boolean" }))
            .expect("type should apply");
        assert_eq!(schema.shape, SchemaShape::Boolean);
    }

    #[test]
    fn any_of_accepts_bare_type_names() {
        let schema = Schema::from_wire(&json!({ "anyOf": ["string", { "type": "null" }] }))
            .expect("bare names should translate");
        assert_eq!(
            schema.shape,
            SchemaShape::AnyOf(vec![Schema::string(), Schema::null()])
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let err = Schema::from_wire(&json!({ "type": "date" })).expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("unsupported property type")));
    }

    #[test]
    fn rejects_missing_type() {
        let err = Schema::from_wire(&json!({ "description": "?" })).expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("missing or not a string")));
    }

    #[test]
    fn rejects_non_string_enum_entries() {
        let err = Schema::from_wire(&json!({ "type": "string", "enum": ["a", 1] }))
            .expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("unexpected enum value type")));
    }

    #[test]
    fn rejects_non_object_sub_property() {
        let err = Schema::from_wire(&json!({
            "type": "object",
            "properties": { "bad": "string" }
        }))
        .expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("sub-property 'bad' is not a valid object")));
    }

    #[test]
    fn rejects_non_string_required_entry() {
        let err = Schema::from_wire(&json!({
            "type": "object",
            "properties": {},
            "required": ["a", 2]
        }))
        .expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("required field is not a string")));
    }

    #[test]
    fn rejects_array_without_items() {
        let err = Schema::from_wire(&json!({ "type": "array" })).expect_err("should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("items schema is missing")));
    }

    #[test]
    fn translation_is_deterministic_and_leaves_input_untouched() {
        let wire = json!({ "type": "object", "properties": { "a": { "type": "number" } } });
        let before = wire.clone();
        let first = Schema::from_wire(&wire).expect("first translation");
        let second = Schema::from_wire(&wire).expect("second translation");
        assert_eq!(first, second);
        assert_eq!(wire, before);
    }

    #[test]
    fn builder_matches_wire_form() {
        let schema = Schema::object()
            .property("prompt", Schema::string().with_description("task"), true)
            .property("inputs", Schema::array(Schema::string()), false);
        assert_eq!(
            schema.to_wire(),
            json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "task" },
                    "inputs": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["prompt"]
            })
        );
    }

    #[test]
    fn descriptor_round_trips_through_rmcp_tool() {
        let mut tool = Tool::new(
            "weather",
            "lookup weather",
            object(json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            })),
        );
        tool.output_schema = Some(Arc::new(object(json!({
            "type": "object",
            "properties": { "temp": { "type": "number" } }
        }))));

        let descriptor = ToolDescriptor::from_wire(&tool).expect("tool should translate");
        assert_eq!(descriptor.name, "weather");
        assert_eq!(descriptor.description, "lookup weather");
        assert!(descriptor.output_schema.is_some());

        let back = descriptor.to_wire();
        assert_eq!(back.name, tool.name);
        assert_eq!(back.input_schema, tool.input_schema);
        assert_eq!(back.output_schema, tool.output_schema);
    }

    #[test]
    fn descriptor_requires_object_input_schema() {
        let tool = Tool::new("odd", "", object(json!({ "type": "string" })));
        let err = ToolDescriptor::from_wire(&tool).expect_err("non-object input should fail");
        assert!(matches!(err, BridgeError::Schema(message) if message.contains("only 'object' is supported")));
    }
}
