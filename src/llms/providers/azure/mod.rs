//! Azure OpenAI chat-completions provider.
//!
//! Talks to `{endpoint}/openai/deployments/{deployment}/chat/completions`
//! with an `api-key` header. Transcript turns are mapped onto chat messages,
//! capability signatures onto function tools named `"{namespace}-{name}"`,
//! and the response is parsed back into a [`Completion`].
//!
//! Transport failures, HTTP 429 and 5xx responses are retried with
//! exponential backoff; anything still failing after `max_retries` is
//! reported as [`CompletionError::ServiceUnavailable`]. Client errors and
//! unusable payloads are reported as [`CompletionError::ServiceError`]
//! without retrying.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::capabilities::{arguments_from_json, arguments_to_json, CapabilityId, CapabilitySignature};
use crate::config::{ConfigError, Settings};
use crate::llms::completion::{Completion, CompletionClient, CompletionError, ExecutionSettings};
use crate::llms::usage::UsageMetrics;
use crate::transcript::{AssistantContent, ToolCallRequest, Turn};

/// Default Azure OpenAI REST API version.
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest slice of an error body quoted in error messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// AzureChatCompletion provider
// ---------------------------------------------------------------------------

/// Completion client backed by an Azure OpenAI deployment.
pub struct AzureChatCompletion {
    deployment: String,
    endpoint: String,
    api_key: String,
    api_version: String,
    system_prompt: Option<String>,
    timeout: Duration,
    max_retries: u32,
    initial_retry_delay: Duration,
    http: reqwest::Client,
    usage: Mutex<UsageMetrics>,
}

impl fmt::Debug for AzureChatCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureChatCompletion")
            .field("deployment", &self.deployment)
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl AzureChatCompletion {
    /// Create a provider for one deployment.
    pub fn new(
        deployment: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            deployment: deployment.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            system_prompt: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: 2,
            initial_retry_delay: Duration::from_secs(1),
            http: reqwest::Client::new(),
            usage: Mutex::new(UsageMetrics::new()),
        }
    }

    /// Build a provider from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut provider = Self::new(
            settings.deployment.clone().unwrap_or_default(),
            settings.endpoint.clone().unwrap_or_default(),
            settings.api_key.clone().unwrap_or_default(),
        )
        .with_api_version(settings.api_version.clone())
        .with_max_retries(settings.max_retries);
        provider.system_prompt = settings.system_prompt.clone();
        Ok(provider)
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry; doubled on each further attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Accumulated token usage.
    pub fn usage(&self) -> UsageMetrics {
        self.usage.lock().clone()
    }

    /// Full URL of the chat-completions endpoint.
    pub fn api_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }

    /// Map the transcript onto chat messages.
    fn build_messages(&self, transcript: &[Turn]) -> Vec<Value> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if let Some(ref prompt) = self.system_prompt {
            messages.push(json!({ "role": "system", "content": prompt }));
        }

        for turn in transcript {
            let message = match turn {
                Turn::User { text } => json!({ "role": "user", "content": text }),
                Turn::Assistant {
                    content: AssistantContent::Text(text),
                } => json!({ "role": "assistant", "content": text }),
                Turn::Assistant {
                    content: AssistantContent::Calls(calls),
                } => {
                    let tool_calls: Vec<Value> = calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.call_id,
                                "type": "function",
                                "function": {
                                    "name": call.capability.qualified(),
                                    "arguments": arguments_to_json(&call.arguments).to_string(),
                                },
                            })
                        })
                        .collect();
                    json!({ "role": "assistant", "content": Value::Null, "tool_calls": tool_calls })
                }
                Turn::ToolResult {
                    call_id, outcome, ..
                } => json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": outcome.to_content(),
                }),
            };
            messages.push(message);
        }
        messages
    }

    /// Map capability signatures onto function tools.
    fn build_tools(capabilities: &[CapabilitySignature]) -> Vec<Value> {
        capabilities
            .iter()
            .map(|sig| {
                json!({
                    "type": "function",
                    "function": {
                        "name": sig.id.qualified(),
                        "description": sig.description,
                        "parameters": sig.parameters_schema(),
                    },
                })
            })
            .collect()
    }

    /// Build the request body.
    fn build_request_body(
        &self,
        transcript: &[Turn],
        capabilities: &[CapabilitySignature],
        settings: &ExecutionSettings,
    ) -> Value {
        let mut body = json!({
            "messages": self.build_messages(transcript),
        });

        if let Some(temp) = settings.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max) = settings.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if !capabilities.is_empty() {
            body["tools"] = Value::Array(Self::build_tools(capabilities));
            body["tool_choice"] = json!(settings.function_choice.tool_choice());
        }
        body
    }

    /// Parse a chat-completions response.
    fn parse_response(response: &Value) -> Result<Completion, CompletionError> {
        if let Some(error) = response.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown Azure API error");
            return Err(CompletionError::ServiceError(msg.to_string()));
        }

        let message = response
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| CompletionError::ServiceError("response has no message".into()))?;

        if let Some(tool_calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            if !tool_calls.is_empty() {
                let requests = tool_calls
                    .iter()
                    .map(Self::parse_tool_call)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Completion::CallRequests(requests));
            }
        }

        match message.get("content") {
            Some(Value::String(text)) => Ok(Completion::FinalAnswer(text.clone())),
            _ => Err(CompletionError::ServiceError(
                "response carries neither content nor tool calls".into(),
            )),
        }
    }

    /// Parse one entry of `message.tool_calls`.
    fn parse_tool_call(call: &Value) -> Result<ToolCallRequest, CompletionError> {
        let call_id = match call.get("id").and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("call_{}", uuid::Uuid::new_v4().simple()),
        };

        let function = call.get("function").ok_or_else(|| {
            CompletionError::ServiceError(format!("tool call '{}' has no function", call_id))
        })?;
        let name = function
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CompletionError::ServiceError(format!("tool call '{}' has no name", call_id))
            })?;

        let raw_args = match function.get("arguments") {
            None | Some(Value::Null) => Value::Null,
            Some(Value::String(s)) if s.trim().is_empty() => Value::Null,
            Some(Value::String(s)) => serde_json::from_str(s).map_err(|e| {
                CompletionError::ServiceError(format!(
                    "tool call '{}' has malformed arguments: {}",
                    call_id, e
                ))
            })?,
            Some(other) => other.clone(),
        };
        let arguments = arguments_from_json(raw_args).ok_or_else(|| {
            CompletionError::ServiceError(format!(
                "tool call '{}' arguments are not an object",
                call_id
            ))
        })?;

        Ok(ToolCallRequest::new(
            call_id,
            CapabilityId::parse_qualified(name),
            arguments,
        ))
    }

    /// One HTTP attempt. `Err((retryable, error))` on failure.
    async fn send_once(&self, body: &Value) -> Result<Value, (bool, CompletionError)> {
        let response = self
            .http
            .post(self.api_url())
            .header("api-key", self.api_key.as_str())
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| (true, CompletionError::ServiceUnavailable(e.to_string())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| (true, CompletionError::ServiceUnavailable(e.to_string())))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err((
                true,
                CompletionError::ServiceUnavailable(format!(
                    "Azure API returned {}: {}",
                    status,
                    truncate(&text)
                )),
            ));
        }
        if !status.is_success() {
            return Err((
                false,
                CompletionError::ServiceError(format!(
                    "Azure API error ({}): {}",
                    status,
                    truncate(&text)
                )),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            (
                false,
                CompletionError::ServiceError(format!(
                    "failed to parse Azure response: {} - body: {}",
                    e,
                    truncate(&text)
                )),
            )
        })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl CompletionClient for AzureChatCompletion {
    fn model(&self) -> &str {
        &self.deployment
    }

    async fn complete(
        &self,
        transcript: &[Turn],
        capabilities: &[CapabilitySignature],
        settings: &ExecutionSettings,
    ) -> Result<Completion, CompletionError> {
        log::debug!(
            "AzureChatCompletion.complete: deployment={}, turns={}, tools={}",
            self.deployment,
            transcript.len(),
            capabilities.len(),
        );

        let body = self.build_request_body(transcript, capabilities, settings);

        let mut retry_delay = self.initial_retry_delay;
        let mut last_error = CompletionError::ServiceUnavailable("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "Azure API retry attempt {} after {:?}: {}",
                    attempt,
                    retry_delay,
                    last_error
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            match self.send_once(&body).await {
                Ok(response) => {
                    if let Some(usage) = response.get("usage") {
                        self.usage.lock().record(usage);
                        log::debug!("Azure usage: {}", usage);
                    }
                    return Self::parse_response(&response);
                }
                Err((true, e)) => last_error = e,
                Err((false, e)) => return Err(e),
            }
        }

        Err(last_error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    use crate::capabilities::{ArgValue, Arguments, ParameterSpec, ReturnSpec, ValueType};
    use crate::llms::completion::FunctionChoiceBehavior;
    use crate::transcript::ToolOutcome;

    fn provider() -> AzureChatCompletion {
        AzureChatCompletion::new("gpt-4o-mini", "https://myresource.openai.azure.com/", "key")
    }

    fn change_state_signature() -> CapabilitySignature {
        CapabilitySignature {
            id: CapabilityId::new("Lights", "change_state"),
            description: "Changes the state of the light".into(),
            parameters: vec![
                ParameterSpec::required("id", ValueType::Integer),
                ParameterSpec::required("is_on", ValueType::Boolean),
            ],
            returns: ReturnSpec::nullable(ValueType::Object),
        }
    }

    fn lamp_request(call_id: &str) -> ToolCallRequest {
        let mut args = Arguments::new();
        args.insert("id".into(), ArgValue::Integer(1));
        args.insert("is_on".into(), ArgValue::Boolean(true));
        ToolCallRequest::new(call_id, CapabilityId::new("Lights", "change_state"), args)
    }

    fn text_response(text: &str) -> Value {
        json!({
            "choices": [{
                "message": { "role": "assistant", "content": text },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    #[test]
    fn test_api_url() {
        let url = provider().api_url();
        assert_eq!(
            url,
            "https://myresource.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let rendered = format!("{:?}", provider());
        assert!(rendered.contains("gpt-4o-mini"));
        assert!(!rendered.contains("\"key\""));
    }

    #[test]
    fn test_build_messages_maps_every_turn() {
        let provider = provider().with_system_prompt("You control lights.");
        let request = lamp_request("call_1");
        let transcript = vec![
            Turn::user("turn on the lamp"),
            Turn::assistant_calls(vec![request.clone()]),
            Turn::tool_result(
                &request,
                ToolOutcome::Success {
                    value: json!({"id": 1, "name": "Table Lamp", "is_on": true}),
                },
            ),
            Turn::assistant_text("The lamp is on."),
        ];

        let messages = provider.build_messages(&transcript);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1], json!({"role": "user", "content": "turn on the lamp"}));

        let call = &messages[2]["tool_calls"][0];
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["function"]["name"], "Lights-change_state");
        let args: Value =
            serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args, json!({"id": 1, "is_on": true}));

        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(messages[4]["content"], "The lamp is on.");
    }

    #[test]
    fn test_build_request_body_with_tools() {
        let settings = ExecutionSettings {
            function_choice: FunctionChoiceBehavior::Auto,
            temperature: Some(0.1),
            max_tokens: Some(256),
        };
        let body = provider().build_request_body(
            &[Turn::user("hi")],
            &[change_state_signature()],
            &settings,
        );
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 256);
        let function = &body["tools"][0]["function"];
        assert_eq!(function["name"], "Lights-change_state");
        assert_eq!(function["parameters"]["required"], json!(["id", "is_on"]));
    }

    #[test]
    fn test_build_request_body_without_tools() {
        let body = provider().build_request_body(&[Turn::user("hi")], &[], &ExecutionSettings::auto());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_response_text() {
        let result = AzureChatCompletion::parse_response(&text_response("Hello there!")).unwrap();
        assert_eq!(result, Completion::FinalAnswer("Hello there!".into()));
    }

    #[test]
    fn test_parse_response_tool_calls_keep_order() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        { "id": "call_a", "type": "function",
                          "function": { "name": "Lights-change_state", "arguments": "{\"id\":1,\"is_on\":true}" } },
                        { "id": "call_b", "type": "function",
                          "function": { "name": "Time-get_time", "arguments": "{}" } }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });

        match AzureChatCompletion::parse_response(&response).unwrap() {
            Completion::CallRequests(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0], lamp_request("call_a"));
                assert_eq!(calls[1].call_id, "call_b");
                assert_eq!(calls[1].capability, CapabilityId::new("Time", "get_time"));
                assert!(calls[1].arguments.is_empty());
            }
            other => panic!("expected call requests, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_call_generates_missing_id() {
        let call = json!({ "function": { "name": "Time-get_time", "arguments": "" } });
        let request = AzureChatCompletion::parse_tool_call(&call).unwrap();
        assert!(request.call_id.starts_with("call_"));
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn test_parse_tool_call_malformed_arguments() {
        let call = json!({ "id": "c1", "function": { "name": "Time-get_time", "arguments": "{not json" } });
        let err = AzureChatCompletion::parse_tool_call(&call).unwrap_err();
        assert!(matches!(err, CompletionError::ServiceError(_)));
    }

    #[test]
    fn test_parse_response_api_error() {
        let response = json!({ "error": { "message": "content filtered" } });
        let err = AzureChatCompletion::parse_response(&response).unwrap_err();
        assert_eq!(err, CompletionError::ServiceError("content filtered".into()));
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = AzureChatCompletion::parse_response(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, CompletionError::ServiceError(_)));
    }

    // --- Fake Azure endpoint ---

    #[derive(Clone)]
    struct FakeAzure {
        hits: Arc<AtomicUsize>,
        failures_before_success: usize,
        failure_status: StatusCode,
    }

    async fn fake_completions(
        State(fake): State<FakeAzure>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let hit = fake.hits.fetch_add(1, Ordering::SeqCst);
        if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some("key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "bad key"}})));
        }
        if hit < fake.failures_before_success {
            return (fake.failure_status, Json(json!({"error": {"message": "try later"}})));
        }
        let turns = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
        (StatusCode::OK, Json(text_response(&format!("saw {} messages", turns))))
    }

    async fn spawn_fake(fake: FakeAzure) -> String {
        let app = Router::new()
            .route(
                "/openai/deployments/:deployment/chat/completions",
                post(fake_completions),
            )
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake(failures: usize, status: StatusCode) -> FakeAzure {
        FakeAzure {
            hits: Arc::new(AtomicUsize::new(0)),
            failures_before_success: failures,
            failure_status: status,
        }
    }

    #[tokio::test]
    async fn test_complete_against_fake_endpoint() {
        let fake = fake(0, StatusCode::OK);
        let endpoint = spawn_fake(fake.clone()).await;
        let provider = AzureChatCompletion::new("gpt-4o-mini", endpoint, "key");

        let result = provider
            .complete(&[Turn::user("hi")], &[], &ExecutionSettings::auto())
            .await;
        let completion = tokio_test::assert_ok!(result);
        assert_eq!(completion, Completion::FinalAnswer("saw 1 messages".into()));
        assert_eq!(provider.usage().total_tokens, 15);
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let fake = fake(2, StatusCode::SERVICE_UNAVAILABLE);
        let endpoint = spawn_fake(fake.clone()).await;
        let provider = AzureChatCompletion::new("gpt-4o-mini", endpoint, "key")
            .with_retry_delay(Duration::from_millis(1));

        let result = provider
            .complete(&[Turn::user("hi")], &[], &ExecutionSettings::auto())
            .await
            .unwrap();
        assert_eq!(result, Completion::FinalAnswer("saw 1 messages".into()));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_complete_gives_up_as_unavailable() {
        let fake = fake(10, StatusCode::TOO_MANY_REQUESTS);
        let endpoint = spawn_fake(fake.clone()).await;
        let provider = AzureChatCompletion::new("gpt-4o-mini", endpoint, "key")
            .with_max_retries(1)
            .with_retry_delay(Duration::from_millis(1));

        let err = provider
            .complete(&[Turn::user("hi")], &[], &ExecutionSettings::auto())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::ServiceUnavailable(_)));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_complete_client_error_not_retried() {
        let fake = fake(0, StatusCode::OK);
        let endpoint = spawn_fake(fake.clone()).await;
        let provider = AzureChatCompletion::new("gpt-4o-mini", endpoint, "wrong")
            .with_retry_delay(Duration::from_millis(1));

        let err = provider
            .complete(&[Turn::user("hi")], &[], &ExecutionSettings::auto())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::ServiceError(_)));
        assert!(err.to_string().contains("401"));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = AzureChatCompletion::new("gpt-4o-mini", format!("http://{}", addr), "key")
            .with_max_retries(0);
        let err = provider
            .complete(&[Turn::user("hi")], &[], &ExecutionSettings::auto())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::ServiceUnavailable(_)));
    }
}
