//! Per-action payload schemas checked at the router boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::types::Payload;

/// Expected JSON kind of a required payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
    Any,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Required fields of an action's payload, by name.
///
/// Fields not listed are passed through untouched; the owning service still
/// decodes the full payload into its own request type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadSchema(BTreeMap<String, FieldKind>);

impl PayloadSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.0.insert(field.into(), kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check `payload`, reporting every missing or mistyped field at once.
    pub fn validate(&self, payload: &Payload) -> Result<(), String> {
        let problems: Vec<String> = self
            .0
            .iter()
            .filter_map(|(field, kind)| match payload.get(field) {
                None | Some(Value::Null) => Some(format!("missing field '{}'", field)),
                Some(value) if !kind.matches(value) => {
                    Some(format!("field '{}' must be {}", field, kind))
                }
                Some(_) => None,
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}
