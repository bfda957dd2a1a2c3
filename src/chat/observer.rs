//! Session observers.
//!
//! An observer is handed to the chat loop at construction and sees every
//! state transition. All methods default to no-ops, so implementors pick
//! what they need. Observers cannot alter the flow.

use crate::llms::{Completion, CompletionError};
use crate::transcript::{ToolCallRequest, ToolOutcome, Transcript, Turn};

/// Hook trait for observing a chat session.
pub trait SessionObserver: Send + Sync {
    /// A user turn was appended.
    fn on_user_turn(&self, _transcript: &Transcript) {}

    /// About to request a completion. `round` counts resolved call batches
    /// in the current user turn.
    fn before_completion(&self, _round: usize, _transcript: &[Turn]) {}

    /// The completion service answered.
    fn after_completion(&self, _completion: &Completion) {}

    /// About to invoke a capability.
    fn before_invoke(&self, _request: &ToolCallRequest) {}

    /// A capability invocation finished (successfully or not).
    fn after_invoke(&self, _request: &ToolCallRequest, _outcome: &ToolOutcome) {}

    /// The completion service failed; the current turn is abandoned.
    fn on_service_error(&self, _error: &CompletionError) {}

    /// The model kept requesting calls past the configured limit.
    fn on_call_chain_limit(&self, _limit: usize) {}

    /// The session ended.
    fn on_terminated(&self, _transcript: &Transcript) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Observer that forwards events to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct LogObserver {
    /// Target used for every record.
    target: Option<String>,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(module_path!())
    }
}

impl SessionObserver for LogObserver {
    fn on_user_turn(&self, transcript: &Transcript) {
        log::debug!(target: self.target(), "Transcript:\n{}", transcript.render());
    }

    fn before_completion(&self, round: usize, transcript: &[Turn]) {
        log::debug!(
            target: self.target(),
            "Requesting completion (round {}, {} turns)",
            round,
            transcript.len()
        );
    }

    fn after_completion(&self, completion: &Completion) {
        match completion {
            Completion::FinalAnswer(text) => {
                log::debug!(target: self.target(), "Final answer ({} chars)", text.len())
            }
            Completion::CallRequests(calls) => {
                log::info!(target: self.target(), "Model requested {} call(s)", calls.len())
            }
        }
    }

    fn before_invoke(&self, request: &ToolCallRequest) {
        log::info!(
            target: self.target(),
            "Invoking {} [{}]",
            request.capability,
            request.call_id
        );
    }

    fn after_invoke(&self, request: &ToolCallRequest, outcome: &ToolOutcome) {
        match outcome {
            ToolOutcome::Success { .. } => log::debug!(
                target: self.target(),
                "{} [{}] succeeded",
                request.capability,
                request.call_id
            ),
            ToolOutcome::Error { kind, message } => log::warn!(
                target: self.target(),
                "{} [{}] failed ({}): {}",
                request.capability,
                request.call_id,
                kind,
                message
            ),
        }
    }

    fn on_service_error(&self, error: &CompletionError) {
        log::error!(target: self.target(), "Completion failed: {}", error);
    }

    fn on_call_chain_limit(&self, limit: usize) {
        log::warn!(
            target: self.target(),
            "Call chain limit of {} rounds reached; answering without further calls",
            limit
        );
    }

    fn on_terminated(&self, transcript: &Transcript) {
        log::info!(target: self.target(), "Session ended after {} turns", transcript.len());
    }
}
