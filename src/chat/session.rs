//! The chat loop state machine.
//!
//! ```text
//! AwaitingInput -> RequestingCompletion -> (ResolvingCalls -> RequestingCompletion)*
//!               -> Emitting -> AwaitingInput
//! AwaitingInput -> Terminated        (exit sentinel or end of input)
//! ```
//!
//! The loop runs one session strictly sequentially. Capability calls are
//! resolved in the order the model emitted them and every result is
//! appended to the transcript under the call-id of its request.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::io::{ConversationIo, Speaker};
use super::observer::{NoopObserver, SessionObserver};
use crate::capabilities::{CapabilityRegistry, CapabilitySignature};
use crate::llms::{Completion, CompletionClient, CompletionError, ExecutionSettings};
use crate::transcript::{ToolCallRequest, ToolOutcome, Transcript, TranscriptError, Turn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    /// The transcript rejected a turn. Ends the session.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The model kept chaining calls. Reported through the observer and
    /// turned into a degraded answer, never returned from `run`.
    #[error("call chain limit of {limit} rounds exceeded")]
    CallChainLimitExceeded { limit: usize },

    #[error("session is not awaiting input (state: {0})")]
    NotAwaitingInput(&'static str),
}

// ---------------------------------------------------------------------------
// Settings and states
// ---------------------------------------------------------------------------

/// Loop policy.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    /// Exact input line that ends the session.
    pub exit_sentinel: String,
    /// Maximum ResolvingCalls rounds per user turn.
    pub max_call_rounds: usize,
    /// Abort a completion request after this long.
    pub completion_timeout: Option<Duration>,
    pub execution: ExecutionSettings,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            exit_sentinel: "exit".to_string(),
            max_call_rounds: 8,
            completion_timeout: None,
            execution: ExecutionSettings::auto(),
        }
    }
}

/// Output produced at the end of a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// The model's final answer.
    Answer(String),
    /// Explanatory answer produced by the loop when the call chain limit hit.
    Degraded(String),
    /// The completion service failed; nothing was added for this request.
    Failure(String),
}

impl Emission {
    pub fn speaker(&self) -> Speaker {
        match self {
            Self::Answer(_) | Self::Degraded(_) => Speaker::Assistant,
            Self::Failure(_) => Speaker::Error,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text) | Self::Degraded(text) | Self::Failure(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingInput,
    RequestingCompletion,
    /// Calls of the last assistant turn, not yet invoked.
    ResolvingCalls(Vec<ToolCallRequest>),
    Emitting(Emission),
    Terminated,
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::RequestingCompletion => "requesting_completion",
            Self::ResolvingCalls(_) => "resolving_calls",
            Self::Emitting(_) => "emitting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ChatLoop
// ---------------------------------------------------------------------------

/// One conversation session: a transcript plus the machinery to extend it.
pub struct ChatLoop {
    client: Arc<dyn CompletionClient>,
    registry: Arc<CapabilityRegistry>,
    /// Advertised signatures. The registry is immutable once shared.
    signatures: Vec<CapabilitySignature>,
    observer: Arc<dyn SessionObserver>,
    settings: LoopSettings,
    transcript: Transcript,
    state: LoopState,
    /// ResolvingCalls rounds completed for the current user turn.
    rounds: usize,
}

impl fmt::Debug for ChatLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatLoop")
            .field("client", &self.client)
            .field("capabilities", &self.signatures.len())
            .field("settings", &self.settings)
            .field("turns", &self.transcript.len())
            .field("state", &self.state)
            .field("rounds", &self.rounds)
            .finish()
    }
}

impl ChatLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        registry: Arc<CapabilityRegistry>,
        settings: LoopSettings,
    ) -> Self {
        let signatures = registry.describe_all();
        log::debug!(
            "Chat loop for model '{}' with {} capabilities",
            client.model(),
            signatures.len()
        );
        Self {
            client,
            registry,
            signatures,
            observer: Arc::new(NoopObserver),
            settings,
            transcript: Transcript::new(),
            state: LoopState::AwaitingInput,
            rounds: 0,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == LoopState::Terminated
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Drive the session until it terminates.
    ///
    /// Returns at once, without notifying the observer again, when the
    /// session has already ended.
    ///
    /// A transcript invariant violation or an I/O failure ends the session
    /// with an error; everything else is handled inside the loop.
    pub async fn run<I>(&mut self, io: &mut I) -> Result<(), SessionError>
    where
        I: ConversationIo + ?Sized,
    {
        if self.is_terminated() {
            return Ok(());
        }
        while !self.is_terminated() {
            if let Err(err) = self.step(io).await {
                self.state = LoopState::Terminated;
                if let SessionError::Transcript(violation) = &err {
                    // Best effort: the session is already over.
                    let _ = io.emit(Speaker::Error, &violation.to_string()).await;
                }
                self.observer.on_terminated(&self.transcript);
                return Err(err);
            }
        }
        self.observer.on_terminated(&self.transcript);
        Ok(())
    }

    /// Perform exactly one state transition.
    ///
    /// On error the session is left `Terminated`.
    pub async fn step<I>(&mut self, io: &mut I) -> Result<(), SessionError>
    where
        I: ConversationIo + ?Sized,
    {
        let state = std::mem::replace(&mut self.state, LoopState::Terminated);
        let next = match state {
            LoopState::AwaitingInput => {
                let line = io.read_input(Speaker::User.prefix()).await?;
                self.accept_input(line)?
            }
            LoopState::RequestingCompletion => self.request_completion().await?,
            LoopState::ResolvingCalls(calls) => self.resolve_calls(calls)?,
            LoopState::Emitting(emission) => {
                io.emit(emission.speaker(), emission.text()).await?;
                LoopState::AwaitingInput
            }
            LoopState::Terminated => LoopState::Terminated,
        };
        log::trace!("Chat loop -> {}", next);
        self.state = next;
        Ok(())
    }

    /// Process one user line without an I/O surface and return what would
    /// have been emitted. `None` when nothing was emitted: the line was
    /// blank or ended the session.
    pub async fn handle_turn(&mut self, text: &str) -> Result<Option<Emission>, SessionError> {
        if self.state != LoopState::AwaitingInput {
            return Err(SessionError::NotAwaitingInput(self.state.name()));
        }
        self.state = LoopState::Terminated;
        let mut state = self.accept_input(Some(text.to_string()))?;
        loop {
            state = match state {
                LoopState::RequestingCompletion => self.request_completion().await?,
                LoopState::ResolvingCalls(calls) => self.resolve_calls(calls)?,
                LoopState::Emitting(emission) => {
                    self.state = LoopState::AwaitingInput;
                    return Ok(Some(emission));
                }
                LoopState::AwaitingInput => {
                    self.state = LoopState::AwaitingInput;
                    return Ok(None);
                }
                LoopState::Terminated => {
                    self.observer.on_terminated(&self.transcript);
                    return Ok(None);
                }
            };
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn accept_input(&mut self, line: Option<String>) -> Result<LoopState, SessionError> {
        let text = match line {
            None => {
                log::info!("End of input, ending session");
                return Ok(LoopState::Terminated);
            }
            Some(text) => text,
        };
        if text == self.settings.exit_sentinel {
            log::info!("Exit requested, ending session");
            return Ok(LoopState::Terminated);
        }
        if text.trim().is_empty() {
            return Ok(LoopState::AwaitingInput);
        }

        self.transcript.append(Turn::user(text))?;
        self.rounds = 0;
        self.observer.on_user_turn(&self.transcript);
        Ok(LoopState::RequestingCompletion)
    }

    async fn request_completion(&mut self) -> Result<LoopState, SessionError> {
        self.observer
            .before_completion(self.rounds, self.transcript.snapshot());

        let request = self.client.complete(
            self.transcript.snapshot(),
            &self.signatures,
            &self.settings.execution,
        );
        let result = match self.settings.completion_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(CompletionError::ServiceUnavailable(format!(
                    "no response within {}ms",
                    limit.as_millis()
                ))),
            },
            None => request.await,
        };

        let completion = match result {
            Ok(Completion::CallRequests(calls)) if calls.is_empty() => {
                return Ok(self.fail_turn(CompletionError::ServiceError(
                    "completion contained an empty set of call requests".into(),
                )));
            }
            Ok(completion) => completion,
            Err(err) => return Ok(self.fail_turn(err)),
        };
        self.observer.after_completion(&completion);

        match completion {
            Completion::FinalAnswer(text) => {
                self.transcript.append(Turn::assistant_text(text.clone()))?;
                Ok(LoopState::Emitting(Emission::Answer(text)))
            }
            Completion::CallRequests(calls) => {
                let limit = self.settings.max_call_rounds;
                if self.rounds >= limit {
                    // Dropped without invoking anything.
                    self.observer.on_call_chain_limit(limit);
                    let text = format!(
                        "I could not finish this request: {}.",
                        SessionError::CallChainLimitExceeded { limit }
                    );
                    self.transcript.append(Turn::assistant_text(text.clone()))?;
                    return Ok(LoopState::Emitting(Emission::Degraded(text)));
                }
                self.transcript.append(Turn::assistant_calls(calls.clone()))?;
                Ok(LoopState::ResolvingCalls(calls))
            }
        }
    }

    fn fail_turn(&self, err: CompletionError) -> LoopState {
        self.observer.on_service_error(&err);
        LoopState::Emitting(Emission::Failure(err.to_string()))
    }

    fn resolve_calls(&mut self, calls: Vec<ToolCallRequest>) -> Result<LoopState, SessionError> {
        for request in &calls {
            self.observer.before_invoke(request);
            let outcome =
                ToolOutcome::from(self.registry.invoke(&request.capability, &request.arguments));
            self.observer.after_invoke(request, &outcome);
            self.transcript.append(Turn::tool_result(request, outcome))?;
        }
        self.rounds += 1;
        Ok(LoopState::RequestingCompletion)
    }
}
