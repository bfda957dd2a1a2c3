//! Error types for capability registration and invocation.

use thiserror::Error;

use super::capability::CapabilityId;

/// Boxed failure raised by a capability's underlying logic.
pub type ExecutionFailure = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the [`CapabilityRegistry`](super::CapabilityRegistry).
///
/// Every variant except `DuplicateCapability` and `InvalidDefinition` can
/// occur during a session; the chat loop folds those into the tool result
/// so the model can react to them.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A capability with the same `(namespace, name)` is already registered.
    #[error("capability '{0}' is already registered")]
    DuplicateCapability(CapabilityId),

    /// No capability is registered under the requested identity.
    #[error("capability '{0}' is not registered")]
    UnknownCapability(CapabilityId),

    /// The arguments do not satisfy the declared parameter schema.
    #[error("invalid arguments for '{id}': {reason}")]
    InvalidArguments { id: CapabilityId, reason: String },

    /// The capability definition itself was rejected at registration.
    #[error("invalid capability definition '{id}': {reason}")]
    InvalidDefinition { id: CapabilityId, reason: String },

    /// The capability ran but its logic failed.
    #[error("capability '{id}' failed: {source}")]
    Execution {
        id: CapabilityId,
        #[source]
        source: ExecutionFailure,
    },
}

impl CapabilityError {
    pub(crate) fn invalid_arguments(id: &CapabilityId, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_definition(id: &CapabilityId, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateCapability(_) => "duplicate_capability",
            Self::UnknownCapability(_) => "unknown_capability",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::Execution { .. } => "execution_error",
        }
    }
}

/// Convenience alias for results produced by the registry.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
