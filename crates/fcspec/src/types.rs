//! Schema types produced by the extractor.
//!
//! `TypeSchema` is the JSON-Schema fragment for one Python type hint;
//! `FunctionSchema` is the function-calling declaration for one function.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Public name → fully-qualified `pkg.module[.Class].function` path.
pub type FunctionMap = IndexMap<String, String>;

// ---------------------------------------------------------------------------
// JSON types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    /// Resolve a simple Python type name to its JSON type.
    /// `Any` is deliberately absent: it maps to a schema with no `type`.
    pub fn from_python_name(name: &str) -> Option<Self> {
        match name {
            "str" | "UUID" => Some(Self::String),
            "int" => Some(Self::Integer),
            "float" => Some(Self::Number),
            "bool" => Some(Self::Boolean),
            "List" | "Tuple" => Some(Self::Array),
            "Dict" => Some(Self::Object),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Type schema  (one type hint)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub json_type: Option<JsonType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeSchema>>,
    #[serde(
        rename = "prefixItems",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prefix_items: Option<Vec<TypeSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, TypeSchema>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TypeSchema {
    /// "Any": no constraints at all.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of(json_type: JsonType) -> Self {
        Self {
            json_type: Some(json_type),
            ..Self::default()
        }
    }

    /// `{"type": "object", "properties": {}}`
    pub fn open_object() -> Self {
        Self {
            properties: Some(IndexMap::new()),
            ..Self::of(JsonType::Object)
        }
    }

    pub fn array_of(items: TypeSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(JsonType::Array)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn is_any(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Function schema  (one documented function)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    #[serde(rename = "type")]
    pub json_type: JsonType,
    pub properties: IndexMap<String, TypeSchema>,
    /// Omitted entirely (never `[]`) when nothing is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Default for ParametersSchema {
    fn default() -> Self {
        Self {
            json_type: JsonType::Object,
            properties: IndexMap::new(),
            required: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: ParametersSchema,
}
