//! Conversation transcript: an append-only log of turns.
//!
//! The transcript enforces the call/result correspondence: every tool result
//! answers a call request made earlier by the assistant, each call-id is
//! requested once and answered at most once, and the result names the same
//! capability the request targeted.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::capabilities::{arguments_to_json, Arguments, CapabilityError, CapabilityId};

// ---------------------------------------------------------------------------
// Turn types
// ---------------------------------------------------------------------------

/// A request from the model to invoke one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation token linking this request to its result.
    pub call_id: String,
    pub capability: CapabilityId,
    pub arguments: Arguments,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        capability: CapabilityId,
        arguments: Arguments,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            capability,
            arguments,
        }
    }
}

/// What an assistant turn carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssistantContent {
    Text(String),
    Calls(Vec<ToolCallRequest>),
}

/// Outcome of one capability invocation, as recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { value: Value },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Content handed back to the model.
    ///
    /// String results are passed through as-is; everything else is JSON.
    /// Errors become a JSON object so the model can tell them apart.
    pub fn to_content(&self) -> String {
        match self {
            Self::Success { value: Value::String(s) } => s.clone(),
            Self::Success { value } => value.to_string(),
            Self::Error { kind, message } => {
                json!({ "error": kind, "message": message }).to_string()
            }
        }
    }
}

impl From<Result<Value, CapabilityError>> for ToolOutcome {
    fn from(result: Result<Value, CapabilityError>) -> Self {
        match result {
            Ok(value) => Self::Success { value },
            Err(e) => Self::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// One immutable entry in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        content: AssistantContent,
    },
    ToolResult {
        call_id: String,
        capability: CapabilityId,
        outcome: ToolOutcome,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: AssistantContent::Text(text.into()),
        }
    }

    pub fn assistant_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: AssistantContent::Calls(calls),
        }
    }

    pub fn tool_result(request: &ToolCallRequest, outcome: ToolOutcome) -> Self {
        Self::ToolResult {
            call_id: request.call_id.clone(),
            capability: request.capability.clone(),
            outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    /// Appending the turn would break the call/result correspondence.
    #[error("transcript invariant violated: {0}")]
    InvariantViolation(String),
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Ordered, append-only log of turns for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    /// call-id -> capability it targeted, for every request seen so far.
    requested: HashMap<String, CapabilityId>,
    /// call-ids that already have a result.
    resolved: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, enforcing the call/result invariants.
    ///
    /// A rejected turn leaves the transcript unchanged.
    pub fn append(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        match &turn {
            Turn::User { .. } => {}
            Turn::Assistant {
                content: AssistantContent::Text(_),
            } => {}
            Turn::Assistant {
                content: AssistantContent::Calls(calls),
            } => {
                if calls.is_empty() {
                    return Err(TranscriptError::InvariantViolation(
                        "assistant call turn carries no call requests".into(),
                    ));
                }
                let mut batch = HashSet::new();
                for call in calls {
                    if self.requested.contains_key(&call.call_id) || !batch.insert(&call.call_id) {
                        return Err(TranscriptError::InvariantViolation(format!(
                            "call-id '{}' was already requested",
                            call.call_id
                        )));
                    }
                }
                for call in calls {
                    self.requested
                        .insert(call.call_id.clone(), call.capability.clone());
                }
            }
            Turn::ToolResult {
                call_id,
                capability,
                ..
            } => {
                let requested = self.requested.get(call_id).ok_or_else(|| {
                    TranscriptError::InvariantViolation(format!(
                        "result for call-id '{}' has no earlier request",
                        call_id
                    ))
                })?;
                if requested != capability {
                    return Err(TranscriptError::InvariantViolation(format!(
                        "result for call-id '{}' names '{}' but the request targeted '{}'",
                        call_id, capability, requested
                    )));
                }
                if !self.resolved.insert(call_id.clone()) {
                    return Err(TranscriptError::InvariantViolation(format!(
                        "call-id '{}' already has a result",
                        call_id
                    )));
                }
            }
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Read-only view of all turns so far.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Call-ids that were requested but have no result yet.
    pub fn pending_calls(&self) -> Vec<&str> {
        let mut pending: Vec<&str> = self
            .requested
            .keys()
            .filter(|id| !self.resolved.contains(*id))
            .map(String::as_str)
            .collect();
        pending.sort_unstable();
        pending
    }

    /// Human-readable rendering for diagnostics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            match turn {
                Turn::User { text } => {
                    let _ = writeln!(out, "User > {}", text);
                }
                Turn::Assistant {
                    content: AssistantContent::Text(text),
                } => {
                    let _ = writeln!(out, "Assistant > {}", text);
                }
                Turn::Assistant {
                    content: AssistantContent::Calls(calls),
                } => {
                    for call in calls {
                        let _ = writeln!(
                            out,
                            "Assistant > [call {}] {}({})",
                            call.call_id,
                            call.capability,
                            render_arguments(&call.arguments)
                        );
                    }
                }
                Turn::ToolResult {
                    call_id,
                    capability,
                    outcome,
                } => {
                    let _ = writeln!(
                        out,
                        "Tool [{}] {} > {}",
                        call_id,
                        capability,
                        outcome.to_content()
                    );
                }
            }
        }
        out
    }
}

fn render_arguments(args: &Arguments) -> String {
    if args.is_empty() {
        return String::new();
    }
    match arguments_to_json(args) {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
