//! Completion service providers.
//!
//! Each provider implements [`CompletionClient`](crate::llms::CompletionClient)
//! and owns its transport, authentication, request formatting and retry
//! policy.

pub mod azure;

pub use azure::AzureChatCompletion;
