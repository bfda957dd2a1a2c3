//! Language-model access for the chat loop.
//!
//! - [`completion`] - the [`CompletionClient`] trait and its request/response types
//! - [`providers`] - concrete services (Azure OpenAI)
//! - [`usage`] - token accounting

pub mod completion;
pub mod providers;
pub mod usage;

pub use completion::{
    Completion, CompletionClient, CompletionError, ExecutionSettings, FunctionChoiceBehavior,
};
pub use providers::AzureChatCompletion;
pub use usage::UsageMetrics;
