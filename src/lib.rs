//! # plugin-chat
//!
//! A conversational agent loop over an Azure OpenAI chat deployment.
//!
//! The model is advertised a registry of typed capabilities grouped into
//! plugins (lights, time). When it asks to call them, the loop invokes each
//! capability, records the results in the transcript under the call-id of
//! the request, and lets the model continue until it produces an answer.
//!
//! ```text
//! ConversationIo -> ChatLoop -> CompletionClient (AzureChatCompletion)
//!                      |
//!                      +-> CapabilityRegistry -> KernelPlugin capabilities
//! ```

pub mod capabilities;
pub mod chat;
pub mod config;
pub mod llms;
pub mod plugins;
pub mod transcript;
pub mod utilities;

pub use capabilities::{
    ArgValue, Arguments, Capability, CapabilityError, CapabilityId, CapabilityRegistry,
    CapabilitySignature, ValueType,
};
pub use chat::{ChatLoop, ConsoleIo, ConversationIo, LogObserver, LoopSettings, SessionObserver};
pub use config::{ConfigError, Settings};
pub use llms::{AzureChatCompletion, Completion, CompletionClient, CompletionError};
pub use plugins::{KernelPlugin, LightsPlugin, TimePlugin};
pub use transcript::{ToolCallRequest, ToolOutcome, Transcript, Turn};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
