use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scopecraft_core::config::LlmConfig;

use crate::conversation::{Message, MessageRole, ToolCallRequest};

/// Tool advertisement sent to the provider: sanitized name, description and
/// JSON Schema parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Forced(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// One chat-completion request as the orchestrator sees it. `cancel` is the
/// caller-supplied signal; it takes precedence over the per-attempt timeout.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ProviderTool>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
    pub cancel: Option<CancellationToken>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_prompt: None,
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: 1_024,
            temperature: None,
            response_format: ResponseFormat::Text,
            cancel: None,
        }
    }
}

/// Normalized provider response: collapsed text content, the tool calls the
/// model requested, the finish reason, and the raw payload for diagnostics.
#[derive(Clone, Debug)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<String>,
    pub raw: Value,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.trim().is_empty())
    }

    fn is_truncated_and_empty(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
            && self.text().is_none()
            && self.tool_calls.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider configuration invalid: {0}")]
    Config(String),
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider rejected request: {0}")]
    BadRequest(String),
    #[error("provider rate limit hit: {0}")]
    RateLimit(String),
    #[error("provider server failure (status {status:?}): {message}")]
    Server { status: Option<u16>, message: String },
    #[error("provider connection failure: {0}")]
    Connection(String),
    #[error("unexpected provider failure: {0}")]
    Unknown(String),
}

impl LlmError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::BadRequest(_) => "bad_request",
            Self::RateLimit(_) => "rate_limit",
            Self::Server { .. } => "server",
            Self::Connection(_) => "connection",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Transient transport failures worth another attempt: 429, retryable
    /// 5xx statuses, and network-level errors. Shape mismatches are reported
    /// as `Server` without a status and are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit(_) | Self::Connection(_) => true,
            Self::Server { status: Some(status), .. } => {
                matches!(status, 500 | 502 | 503)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 250, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Network(String),
}

/// HTTP seam below the completion client. Swappable so retry, timeout and
/// classification logic can be exercised without a live endpoint.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn execute(&self, payload: &Value) -> Result<TransportReply, TransportError>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }
}

#[async_trait]
impl CompletionTransport for ReqwestTransport {
    async fn execute(&self, payload: &Value) -> Result<TransportReply, TransportError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        Ok(TransportReply { status, body })
    }
}

/// Chat-completion seam the orchestrator drives. Implemented by the HTTP
/// client below and by scripted fakes in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

pub struct HttpChatClient<T = ReqwestTransport> {
    transport: T,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
    telemetry: bool,
}

impl HttpChatClient<ReqwestTransport> {
    /// Build from configuration. A missing API key is a hard configuration
    /// error raised here, before any network call.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| LlmError::Config("llm.api_key is not configured".to_string()))?;

        Ok(Self {
            transport: ReqwestTransport::new(config.base_url.clone(), api_key),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
            telemetry: config.telemetry,
        })
    }
}

impl<T> HttpChatClient<T>
where
    T: CompletionTransport,
{
    pub fn with_transport(
        transport: T,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self { transport, model: model.into(), timeout, retry, telemetry: false }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let payload = build_payload(&self.model, request, max_tokens);
        let call = self.transport.execute(&payload);

        let outcome = if let Some(cancel) = &request.cancel {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LlmError::Connection("request cancelled by caller".to_string()));
                }
                outcome = tokio::time::timeout(self.timeout, call) => outcome,
            }
        } else {
            tokio::time::timeout(self.timeout, call).await
        };

        let reply = match outcome {
            Err(_elapsed) => {
                return Err(LlmError::Connection(format!(
                    "provider call exceeded {}s timeout",
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(TransportError::Network(message))) => {
                return Err(LlmError::Connection(message));
            }
            Ok(Ok(reply)) => reply,
        };

        if !(200..300).contains(&reply.status) {
            return Err(classify_status(reply.status, &reply.body));
        }

        let raw: Value = serde_json::from_str(&reply.body).map_err(|error| LlmError::Server {
            status: None,
            message: format!("provider returned unparseable body: {error}"),
        })?;
        parse_completion(raw)
    }
}

#[async_trait]
impl<T> ChatClient for HttpChatClient<T>
where
    T: CompletionTransport,
{
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let mut max_tokens = request.max_tokens.max(1);
        let mut escalated = false;
        let mut attempt = 0u32;

        loop {
            let started = Instant::now();
            match self.attempt(&request, max_tokens).await {
                Ok(completion) => {
                    if self.telemetry {
                        info!(
                            model = %self.model,
                            latency_ms = started.elapsed().as_millis() as u64,
                            attempt,
                            finish_reason = completion.finish_reason.as_deref().unwrap_or("none"),
                            tool_calls = completion.tool_calls.len(),
                            "provider completion succeeded"
                        );
                    }
                    // A truncated, contentless completion gets one second
                    // chance with a doubled output budget.
                    if completion.is_truncated_and_empty() && !escalated {
                        escalated = true;
                        max_tokens = max_tokens.saturating_mul(2);
                        debug!(max_tokens, "completion truncated with no content; escalating budget");
                        continue;
                    }
                    return Ok(completion);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        kind = error.kind(),
                        error = %error,
                        "provider call failed; retrying"
                    );
                    attempt += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn build_payload(model: &str, request: &CompletionRequest, max_tokens: u32) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system_prompt) = &request.system_prompt {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    for message in &request.messages {
        messages.push(wire_message(message));
    }

    let mut payload = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    });

    if let Some(temperature) = request.temperature {
        payload["temperature"] = json!(temperature);
    }
    if request.response_format == ResponseFormat::JsonObject {
        payload["response_format"] = json!({ "type": "json_object" });
    }
    if !request.tools.is_empty() {
        payload["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect(),
        );
        payload["tool_choice"] = match &request.tool_choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Forced(name) => {
                json!({ "type": "function", "function": { "name": name } })
            }
        };
    }

    payload
}

fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };

    let mut wire = json!({ "role": role, "content": message.content });
    if message.has_tool_calls() {
        wire["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    })
                })
                .collect(),
        );
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(tool_call_id);
    }
    wire
}

fn classify_status(status: u16, body: &str) -> LlmError {
    let message = truncate_body(body);
    match status {
        401 => LlmError::Auth(message),
        404 => LlmError::BadRequest(format!(
            "endpoint or model not found (is the configured model name valid?): {message}"
        )),
        429 => LlmError::RateLimit(message),
        400..=499 => LlmError::BadRequest(message),
        _ => LlmError::Server { status: Some(status), message },
    }
}

fn parse_completion(raw: Value) -> Result<Completion, LlmError> {
    let message = raw
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .filter(|message| message.is_object())
        .ok_or_else(|| LlmError::Server {
            status: None,
            message: format!("provider response shape mismatch: {raw}"),
        })?;

    let content = extract_content(message.get("content"));
    let tool_calls = extract_tool_calls(message.get("tool_calls"));
    let finish_reason = raw["choices"][0]
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(|reason| reason.to_string());

    Ok(Completion { content, tool_calls, finish_reason, raw })
}

/// Collapse the provider's content field to a single string. Tolerates the
/// plain-string shape, the array-of-parts shape, and the legacy object
/// shape with a `text` field.
fn extract_content(content: Option<&Value>) -> Option<String> {
    match content {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Array(parts)) => {
            let mut collected = String::new();
            for part in parts {
                match part {
                    Value::String(text) => collected.push_str(text),
                    Value::Object(_) => {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            collected.push_str(text);
                        }
                    }
                    _ => {}
                }
            }
            (!collected.is_empty()).then_some(collected)
        }
        Some(Value::Object(object)) => {
            object.get("text").and_then(Value::as_str).map(|text| text.to_string())
        }
        Some(_) => None,
    }
}

fn extract_tool_calls(tool_calls: Option<&Value>) -> Vec<ToolCallRequest> {
    let Some(Value::Array(calls)) = tool_calls else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let id = call.get("id").and_then(Value::as_str)?.to_string();
            let function = call.get("function")?;
            let name = function.get("name").and_then(Value::as_str)?.to_string();
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) => raw.clone(),
                Some(other) if other.is_object() => other.to_string(),
                _ => "{}".to_string(),
            };
            Some(ToolCallRequest { id, name, arguments })
        })
        .collect()
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.len() > LIMIT {
        let cut = body
            .char_indices()
            .take_while(|(index, _)| *index <= LIMIT)
            .last()
            .map(|(index, _)| index)
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::conversation::Message;
    use crate::llm::{
        build_payload, classify_status, extract_content, parse_completion, ChatClient,
        CompletionRequest, CompletionTransport, HttpChatClient, LlmError, ProviderTool,
        ResponseFormat, RetryPolicy, ToolChoice, TransportError, TransportReply,
    };

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<TransportReply, TransportError>>>,
        payloads: Arc<Mutex<Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<TransportReply, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                payloads: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn execute(&self, payload: &Value) -> Result<TransportReply, TransportError> {
            self.payloads.lock().expect("payload lock").push(payload.clone());
            self.replies
                .lock()
                .expect("reply lock")
                .pop_front()
                .unwrap_or(Err(TransportError::Network("script exhausted".to_string())))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl CompletionTransport for HangingTransport {
        async fn execute(&self, _payload: &Value) -> Result<TransportReply, TransportError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Err(TransportError::Network("unreachable".to_string()))
        }
    }

    fn ok_reply(body: Value) -> Result<TransportReply, TransportError> {
        Ok(TransportReply { status: 200, body: body.to_string() })
    }

    fn status_reply(status: u16, body: &str) -> Result<TransportReply, TransportError> {
        Ok(TransportReply { status, body: body.to_string() })
    }

    fn text_completion_body(text: &str) -> Value {
        json!({
            "choices": [{
                "message": { "role": "assistant", "content": text },
                "finish_reason": "stop",
            }]
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { max_retries: 3, base_delay_ms: 1, max_delay_ms: 4 }
    }

    fn client_with(
        transport: ScriptedTransport,
    ) -> (HttpChatClient<ScriptedTransport>, Arc<Mutex<Vec<Value>>>) {
        let payloads = transport.payloads.clone();
        let client = HttpChatClient::with_transport(
            transport,
            "test-model",
            Duration::from_millis(200),
            fast_retry(),
        );
        (client, payloads)
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 500 };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(12), Duration::from_millis(500));
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(classify_status(401, "no"), LlmError::Auth(_)));
        assert!(matches!(classify_status(429, "slow down"), LlmError::RateLimit(_)));
        assert!(matches!(classify_status(400, "bad"), LlmError::BadRequest(_)));
        assert!(matches!(classify_status(503, "down"), LlmError::Server { status: Some(503), .. }));

        let not_found = classify_status(404, "missing");
        assert!(matches!(not_found, LlmError::BadRequest(_)));
        assert!(not_found.to_string().contains("model name"));
    }

    #[test]
    fn retryability_follows_transport_semantics() {
        assert!(LlmError::RateLimit("429".to_string()).is_retryable());
        assert!(LlmError::Connection("reset".to_string()).is_retryable());
        assert!(LlmError::Server { status: Some(502), message: String::new() }.is_retryable());
        assert!(!LlmError::Server { status: Some(501), message: String::new() }.is_retryable());
        assert!(!LlmError::Server { status: None, message: "shape".to_string() }.is_retryable());
        assert!(!LlmError::Auth("401".to_string()).is_retryable());
        assert!(!LlmError::BadRequest("400".to_string()).is_retryable());
    }

    #[test]
    fn content_extraction_tolerates_all_shapes() {
        assert_eq!(extract_content(Some(&json!("plain"))), Some("plain".to_string()));
        assert_eq!(
            extract_content(Some(&json!([{"type": "text", "text": "a"}, {"text": "b"}, "c"]))),
            Some("abc".to_string())
        );
        assert_eq!(extract_content(Some(&json!({"text": "legacy"}))), Some("legacy".to_string()));
        assert_eq!(extract_content(Some(&json!(null))), None);
        assert_eq!(extract_content(None), None);
        assert_eq!(extract_content(Some(&json!([]))), None);
    }

    #[test]
    fn shape_mismatch_is_a_server_error_with_raw_payload() {
        let error = parse_completion(json!({"unexpected": true}))
            .expect_err("missing choices must be rejected");
        match error {
            LlmError::Server { status: None, message } => {
                assert!(message.contains("unexpected"));
            }
            other => panic!("expected shape-mismatch server error, got {other:?}"),
        }
    }

    #[test]
    fn tool_call_arguments_survive_object_and_string_shapes() {
        let completion = parse_completion(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "c1", "function": {"name": "a", "arguments": "{\"x\":1}"}},
                        {"id": "c2", "function": {"name": "b", "arguments": {"y": 2}}},
                    ],
                },
                "finish_reason": "tool_calls",
            }]
        }))
        .expect("completion should parse");

        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[0].arguments, "{\"x\":1}");
        assert_eq!(completion.tool_calls[1].arguments, "{\"y\":2}");
        assert!(completion.content.is_none());
    }

    #[test]
    fn payload_carries_tools_choice_and_response_format() {
        let mut request = CompletionRequest::new(vec![Message::user("hi")]);
        request.system_prompt = Some("be brief".to_string());
        request.tools = vec![ProviderTool {
            name: "estimates_getProjectDetail".to_string(),
            description: "Fetch a project".to_string(),
            parameters: json!({"type": "object"}),
        }];
        request.tool_choice = ToolChoice::Forced("estimates_getProjectDetail".to_string());
        request.response_format = ResponseFormat::JsonObject;

        let payload = build_payload("test-model", &request, 256);
        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["max_tokens"], 256);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["tools"][0]["function"]["name"], "estimates_getProjectDetail");
        assert_eq!(
            payload["tool_choice"]["function"]["name"],
            "estimates_getProjectDetail"
        );
        assert_eq!(payload["response_format"]["type"], "json_object");
    }

    #[test]
    fn payload_without_tools_omits_tool_choice() {
        let request = CompletionRequest::new(vec![Message::user("hi")]);
        let payload = build_payload("test-model", &request, 64);
        assert!(payload.get("tools").is_none());
        assert!(payload.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn two_503s_then_success_returns_payload_after_two_retries() {
        let transport = ScriptedTransport::new(vec![
            status_reply(503, "down"),
            status_reply(503, "still down"),
            ok_reply(text_completion_body("recovered")),
        ]);
        let (client, payloads) = client_with(transport);

        let completion = client
            .complete(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .expect("third attempt should succeed");

        assert_eq!(completion.text(), Some("recovered"));
        assert_eq!(payloads.lock().expect("payloads").len(), 3, "two retries, then success");
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            status_reply(401, "bad key"),
            ok_reply(text_completion_body("never reached")),
        ]);
        let (client, payloads) = client_with(transport);

        let error = client
            .complete(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .expect_err("401 must surface immediately");
        assert!(matches!(error, LlmError::Auth(_)));
        assert_eq!(payloads.lock().expect("payloads").len(), 1);
    }

    #[tokio::test]
    async fn retries_exhausted_surfaces_last_error() {
        let transport = ScriptedTransport::new(vec![
            status_reply(503, "down"),
            status_reply(503, "down"),
            status_reply(503, "down"),
            status_reply(503, "down"),
        ]);
        let (client, payloads) = client_with(transport);

        let error = client
            .complete(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .expect_err("retries must exhaust");
        assert!(matches!(error, LlmError::Server { status: Some(503), .. }));
        assert_eq!(payloads.lock().expect("payloads").len(), 4, "initial try plus three retries");
    }

    #[tokio::test]
    async fn hard_timeout_aborts_attempt_as_connection_error() {
        let client = HttpChatClient::with_transport(
            HangingTransport,
            "test-model",
            Duration::from_millis(20),
            RetryPolicy { max_retries: 0, base_delay_ms: 1, max_delay_ms: 1 },
        );

        let error = client
            .complete(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .expect_err("hanging transport must time out");
        assert!(matches!(error, LlmError::Connection(_)));
    }

    #[tokio::test]
    async fn caller_cancellation_takes_precedence() {
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();

        let client = HttpChatClient::with_transport(
            HangingTransport,
            "test-model",
            Duration::from_secs(30),
            RetryPolicy { max_retries: 0, base_delay_ms: 1, max_delay_ms: 1 },
        );
        let mut request = CompletionRequest::new(vec![Message::user("hello")]);
        request.cancel = Some(cancel);

        let error = client.complete(request).await.expect_err("cancelled call must fail fast");
        assert!(error.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn truncated_empty_completion_escalates_token_budget_once() {
        let truncated = json!({
            "choices": [{
                "message": { "role": "assistant", "content": null },
                "finish_reason": "length",
            }]
        });
        let transport = ScriptedTransport::new(vec![
            ok_reply(truncated.clone()),
            ok_reply(text_completion_body("full answer")),
        ]);
        let (client, payloads) = client_with(transport);

        let mut request = CompletionRequest::new(vec![Message::user("hello")]);
        request.max_tokens = 128;
        let completion = client.complete(request).await.expect("escalated retry should succeed");

        assert_eq!(completion.text(), Some("full answer"));
        let recorded = payloads.lock().expect("payloads");
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0]["max_tokens"], 128);
        assert_eq!(recorded[1]["max_tokens"], 256, "second attempt doubles the budget");
    }
}
