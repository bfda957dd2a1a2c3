//! # Capability Registry
//!
//! Capabilities ("plugins" from the model's point of view) are named, typed
//! callables. Each one is identified by a `(namespace, name)` pair and
//! declares an ordered parameter list and a return type.
//!
//! ## Lifecycle
//!
//! 1. Setup code registers capabilities, usually a whole plugin at a time
//!    via [`CapabilityRegistry::add_plugin`].
//! 2. [`CapabilityRegistry::describe_all`] produces the signatures that are
//!    advertised to the completion service.
//! 3. The chat loop resolves each call request with
//!    [`CapabilityRegistry::invoke`], which validates arguments before
//!    running anything.

pub mod capability;
pub mod error;
pub mod registry;
pub mod value;

pub use capability::{
    Capability, CapabilityBuilder, CapabilityFn, CapabilityId, CapabilitySignature,
    ParameterSpec, ReturnSpec,
};
pub use error::{CapabilityError, CapabilityResult, ExecutionFailure};
pub use registry::CapabilityRegistry;
pub use value::{arguments_from_json, arguments_to_json, ArgValue, Arguments, ValueType};
