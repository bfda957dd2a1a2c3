//! Capability definition: the unit of functionality a model may call.
//!
//! A capability has a namespaced identity, a description, an ordered list of
//! typed parameters, a declared return type, and the function that runs it.
//! The signature part ([`CapabilitySignature`]) is what gets advertised to the
//! completion service; the function never leaves the process.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ExecutionFailure;
use super::value::{Arguments, ValueType};

/// Separator between namespace and name in the fully qualified form.
pub const QUALIFIED_SEPARATOR: char = '-';

// ---------------------------------------------------------------------------
// CapabilityId
// ---------------------------------------------------------------------------

/// Identity of a capability: a `(namespace, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityId {
    pub namespace: String,
    pub name: String,
}

impl CapabilityId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Fully qualified name as advertised to the model: `"Lights-change_state"`.
    pub fn qualified(&self) -> String {
        format!("{}{}{}", self.namespace, QUALIFIED_SEPARATOR, self.name)
    }

    /// Parse a fully qualified name.
    ///
    /// A name without a separator yields an empty namespace, which no
    /// registered capability can have, so lookups fail with
    /// `UnknownCapability` instead of being guessed.
    pub fn parse_qualified(qualified: &str) -> Self {
        match qualified.split_once(QUALIFIED_SEPARATOR) {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("", qualified),
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, QUALIFIED_SEPARATOR, self.name)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl ParameterSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            description: String::new(),
            required: true,
        }
    }

    /// An optional parameter.
    pub fn optional(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            required: false,
            ..Self::required(name, value_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Declared return type of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSpec {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Whether `null` is a legal result.
    #[serde(default)]
    pub nullable: bool,
}

impl ReturnSpec {
    pub fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            nullable: false,
        }
    }

    pub fn nullable(value_type: ValueType) -> Self {
        Self {
            value_type,
            nullable: true,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        (self.nullable && value.is_null()) || self.value_type.matches_json(value)
    }
}

/// Everything the model is told about a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySignature {
    pub id: CapabilityId,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub returns: ReturnSpec,
}

impl CapabilitySignature {
    /// JSON schema object describing the parameter list.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = json!({ "type": param.value_type.json_schema_type() });
            if param.value_type == ValueType::Array {
                prop["items"] = json!({});
            }
            if !param.description.is_empty() {
                prop["description"] = json!(param.description);
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Function backing a capability. Receives already validated arguments.
pub type CapabilityFn =
    Arc<dyn Fn(&Arguments) -> Result<Value, ExecutionFailure> + Send + Sync>;

/// A registered capability: signature plus implementation.
///
/// Immutable once built; the registry hands out shared references only.
#[derive(Clone)]
pub struct Capability {
    signature: CapabilitySignature,
    func: CapabilityFn,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("id", &self.signature.id)
            .field("parameters", &self.signature.parameters.len())
            .field("returns", &self.signature.returns)
            .finish()
    }
}

impl Capability {
    /// Start building a capability.
    pub fn builder(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> CapabilityBuilder {
        CapabilityBuilder {
            id: CapabilityId::new(namespace, name),
            description: String::new(),
            parameters: Vec::new(),
            returns: ReturnSpec::of(ValueType::String),
        }
    }

    pub fn id(&self) -> &CapabilityId {
        &self.signature.id
    }

    pub fn signature(&self) -> &CapabilitySignature {
        &self.signature
    }

    pub(crate) fn call(&self, args: &Arguments) -> Result<Value, ExecutionFailure> {
        (self.func)(args)
    }
}

/// Builder for [`Capability`].
#[derive(Debug)]
pub struct CapabilityBuilder {
    id: CapabilityId,
    description: String,
    parameters: Vec<ParameterSpec>,
    returns: ReturnSpec,
}

impl CapabilityBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnSpec) -> Self {
        self.returns = returns;
        self
    }

    /// Attach the implementation and finish.
    pub fn handler<F>(self, func: F) -> Capability
    where
        F: Fn(&Arguments) -> Result<Value, ExecutionFailure> + Send + Sync + 'static,
    {
        Capability {
            signature: CapabilitySignature {
                id: self.id,
                description: self.description,
                parameters: self.parameters,
                returns: self.returns,
            },
            func: Arc::new(func),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_round_trip() {
        let id = CapabilityId::new("Lights", "change_state");
        assert_eq!(id.qualified(), "Lights-change_state");
        assert_eq!(CapabilityId::parse_qualified("Lights-change_state"), id);
    }

    #[test]
    fn test_parse_qualified_without_separator() {
        let id = CapabilityId::parse_qualified("get_lights");
        assert_eq!(id.namespace, "");
        assert_eq!(id.name, "get_lights");
    }

    #[test]
    fn test_parameters_schema() {
        let sig = CapabilitySignature {
            id: CapabilityId::new("Lights", "change_state"),
            description: "Changes the state of the light".into(),
            parameters: vec![
                ParameterSpec::required("id", ValueType::Integer).with_description("Light id"),
                ParameterSpec::optional("note", ValueType::String),
                ParameterSpec::optional("tags", ValueType::Array),
            ],
            returns: ReturnSpec::nullable(ValueType::Object),
        };
        let schema = sig.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["id"]["type"], "integer");
        assert_eq!(schema["properties"]["id"]["description"], "Light id");
        assert!(schema["properties"]["note"].get("description").is_none());
        assert_eq!(schema["properties"]["tags"], json!({"type": "array", "items": {}}));
        assert_eq!(schema["required"], json!(["id"]));
    }

    #[test]
    fn test_return_spec_accepts() {
        assert!(ReturnSpec::nullable(ValueType::Object).accepts(&Value::Null));
        assert!(!ReturnSpec::of(ValueType::Object).accepts(&Value::Null));
        assert!(ReturnSpec::of(ValueType::Array).accepts(&json!([])));
        assert!(!ReturnSpec::of(ValueType::Array).accepts(&json!({})));
        assert!(ReturnSpec::of(ValueType::String).accepts(&json!("10:00 AM")));
    }
}
