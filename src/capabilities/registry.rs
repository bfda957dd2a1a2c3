//! Capability Registry: resolves `(namespace, name)` identities to capabilities.
//!
//! Capabilities are registered once during setup, advertised in
//! registration order, and invoked by exact identity. The registry is not
//! mutated after a session starts, so it can be shared behind an `Arc`
//! without locking.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::capability::{Capability, CapabilityId, CapabilitySignature};
use super::error::{CapabilityError, CapabilityResult};
use super::value::{ArgValue, Arguments};
use crate::plugins::KernelPlugin;

/// Registry of callable capabilities.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    /// Capabilities in registration order.
    capabilities: Vec<Capability>,
    /// Identity -> index into `capabilities`.
    index: HashMap<CapabilityId, usize>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability.
    ///
    /// Fails with `DuplicateCapability` if the identity is taken, or
    /// `InvalidDefinition` if the schema is malformed.
    pub fn register(&mut self, capability: Capability) -> CapabilityResult<()> {
        validate_definition(&capability)?;
        if self.index.contains_key(capability.id()) {
            return Err(CapabilityError::DuplicateCapability(capability.id().clone()));
        }
        log::debug!("Registered capability {}", capability.id());
        self.index
            .insert(capability.id().clone(), self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Register every capability a plugin exposes.
    ///
    /// All-or-nothing: if any capability is rejected, none are added.
    /// Returns the number of capabilities registered.
    pub fn add_plugin<P: KernelPlugin + ?Sized>(&mut self, plugin: &P) -> CapabilityResult<usize> {
        let capabilities = plugin.capabilities();

        let mut seen = HashSet::new();
        for cap in &capabilities {
            validate_definition(cap)?;
            if cap.id().namespace != plugin.namespace() {
                return Err(CapabilityError::invalid_definition(
                    cap.id(),
                    format!("namespace differs from plugin '{}'", plugin.namespace()),
                ));
            }
            if self.index.contains_key(cap.id()) || !seen.insert(cap.id().clone()) {
                return Err(CapabilityError::DuplicateCapability(cap.id().clone()));
            }
        }

        let count = capabilities.len();
        for cap in capabilities {
            self.register(cap)?;
        }
        log::info!("Added plugin '{}' ({} capabilities)", plugin.namespace(), count);
        Ok(count)
    }

    /// Signatures of all capabilities, in registration order.
    pub fn describe_all(&self) -> Vec<CapabilitySignature> {
        self.capabilities
            .iter()
            .map(|c| c.signature().clone())
            .collect()
    }

    /// Look up a capability by identity.
    pub fn get(&self, id: &CapabilityId) -> Option<&Capability> {
        self.index.get(id).map(|&i| &self.capabilities[i])
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.index.contains_key(id)
    }

    /// Validate arguments against the schema and run the capability.
    ///
    /// Validation happens before any side effect. The result is checked
    /// against the declared return type.
    pub fn invoke(&self, id: &CapabilityId, arguments: &Arguments) -> CapabilityResult<Value> {
        let capability = self
            .get(id)
            .ok_or_else(|| CapabilityError::UnknownCapability(id.clone()))?;

        let bound = bind_arguments(capability, arguments)?;

        let result = capability
            .call(&bound)
            .map_err(|source| CapabilityError::Execution {
                id: id.clone(),
                source,
            })?;

        let returns = capability.signature().returns;
        if !returns.accepts(&result) {
            return Err(CapabilityError::Execution {
                id: id.clone(),
                source: format!(
                    "returned a value that is not of the declared type '{}'",
                    returns.value_type
                )
                .into(),
            });
        }
        Ok(result)
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Names must be usable inside a function-tool name.
fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_definition(capability: &Capability) -> CapabilityResult<()> {
    let id = capability.id();
    if !is_valid_identifier(&id.namespace) {
        return Err(CapabilityError::invalid_definition(
            id,
            "namespace must be non-empty and contain only [A-Za-z0-9_]",
        ));
    }
    if !is_valid_identifier(&id.name) {
        return Err(CapabilityError::invalid_definition(
            id,
            "name must be non-empty and contain only [A-Za-z0-9_]",
        ));
    }

    let mut names = HashSet::new();
    for param in &capability.signature().parameters {
        if !is_valid_identifier(&param.name) {
            return Err(CapabilityError::invalid_definition(
                id,
                format!("illegal parameter name '{}'", param.name),
            ));
        }
        if !names.insert(param.name.as_str()) {
            return Err(CapabilityError::invalid_definition(
                id,
                format!("parameter '{}' declared twice", param.name),
            ));
        }
    }
    Ok(())
}

/// Check `arguments` against the parameter list and coerce loose values.
fn bind_arguments(capability: &Capability, arguments: &Arguments) -> CapabilityResult<Arguments> {
    let id = capability.id();
    let params = &capability.signature().parameters;

    if let Some(unknown) = arguments
        .keys()
        .find(|k| !params.iter().any(|p| &p.name == *k))
    {
        return Err(CapabilityError::invalid_arguments(
            id,
            format!("unexpected parameter '{}'", unknown),
        ));
    }

    let mut bound = Arguments::new();
    for param in params {
        // An explicit null binds nothing.
        let supplied = arguments
            .get(&param.name)
            .filter(|v| !matches!(v, ArgValue::Structured(Value::Null)));
        match supplied {
            Some(value) => {
                let coerced = param.value_type.coerce(value).ok_or_else(|| {
                    CapabilityError::invalid_arguments(
                        id,
                        format!(
                            "parameter '{}' expects {}, got {}",
                            param.name,
                            param.value_type,
                            value.type_name()
                        ),
                    )
                })?;
                bound.insert(param.name.clone(), coerced);
            }
            None if param.required => {
                return Err(CapabilityError::invalid_arguments(
                    id,
                    format!("missing required parameter '{}'", param.name),
                ));
            }
            None => {}
        }
    }
    Ok(bound)
}
