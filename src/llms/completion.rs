//! Completion client contract.
//!
//! The chat loop talks to a language model only through
//! [`CompletionClient::complete`]: it hands over the transcript so far and
//! the advertised capability signatures, and gets back either a final text
//! answer or a batch of capability call requests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::CapabilitySignature;
use crate::transcript::{ToolCallRequest, Turn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the completion service. Fatal to the current user turn only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// The service could not be reached, timed out, or kept failing
    /// transiently after retries.
    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service answered with an error or an unusable payload.
    #[error("completion service error: {0}")]
    ServiceError(String),
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How the model may use the advertised capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionChoiceBehavior {
    /// The model may call zero or more capabilities on its own, without
    /// per-call confirmation.
    #[default]
    Auto,
    /// Capabilities are advertised but the model must answer in text.
    NoneInvoke,
    /// The model must call at least one capability.
    Required,
}

impl FunctionChoiceBehavior {
    /// Value of the chat-completions `tool_choice` field.
    pub fn tool_choice(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::NoneInvoke => "none",
            Self::Required => "required",
        }
    }
}

/// Per-request execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub function_choice: FunctionChoiceBehavior,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ExecutionSettings {
    /// Settings that let the model call capabilities autonomously.
    pub fn auto() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// What the model produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    FinalAnswer(String),
    /// Non-empty, in the order the model emitted them.
    CallRequests(Vec<ToolCallRequest>),
}

// ---------------------------------------------------------------------------
// CompletionClient trait
// ---------------------------------------------------------------------------

/// A language-model completion service.
///
/// Implementations must not mutate or retain the transcript they are given.
#[async_trait]
pub trait CompletionClient: Send + Sync + fmt::Debug {
    /// Model or deployment identifier, for diagnostics.
    fn model(&self) -> &str;

    /// Produce the next assistant turn.
    async fn complete(
        &self,
        transcript: &[Turn],
        capabilities: &[CapabilitySignature],
        settings: &ExecutionSettings,
    ) -> Result<Completion, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_choice_values() {
        assert_eq!(FunctionChoiceBehavior::Auto.tool_choice(), "auto");
        assert_eq!(FunctionChoiceBehavior::NoneInvoke.tool_choice(), "none");
        assert_eq!(FunctionChoiceBehavior::Required.tool_choice(), "required");
    }

    #[test]
    fn test_default_settings_are_auto() {
        let settings = ExecutionSettings::auto();
        assert_eq!(settings.function_choice, FunctionChoiceBehavior::Auto);
        assert!(settings.temperature.is_none());
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: ExecutionSettings =
            serde_json::from_str(r#"{"function_choice": "required", "temperature": 0.2}"#)
                .unwrap();
        assert_eq!(settings.function_choice, FunctionChoiceBehavior::Required);
        assert_eq!(settings.temperature, Some(0.2));
    }
}
