//! OpenAI-compatible provider implementation.
//!
//! Talks to any endpoint exposing `/chat/completions` (OpenAI, OpenRouter,
//! vLLM, LiteLLM proxies).
//!
//! Supports:
//! - Streaming SSE completions with tool calls, for reasoning turns
//! - Non-streaming completions with `response_format`, for the elaboration step
//! - Multimodal user messages (text plus `image_url` parts)

use async_trait::async_trait;
use faceagent_config::AppConfig;
use faceagent_core::error::ProviderError;
use faceagent_core::message::{Message, MessageToolCall, Role};
use faceagent_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build the provider described by the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("no API key configured".into()))?;
        Self::new(
            "openai",
            config.provider.base_url.clone(),
            api_key,
            Duration::from_secs(config.provider.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let content = if m.role == Role::User && !m.images.is_empty() {
                    let mut parts = vec![serde_json::json!({ "type": "text", "text": m.content })];
                    parts.extend(m.images.iter().map(|url| {
                        serde_json::json!({ "type": "image_url", "image_url": { "url": url } })
                    }));
                    Some(serde_json::Value::Array(parts))
                } else if m.role == Role::Assistant && m.content.is_empty() && !m.tool_calls.is_empty() {
                    None
                } else {
                    Some(serde_json::Value::String(m.content.clone()))
                };

                ApiMessage {
                    role: m.role.as_str().into(),
                    content,
                    tool_calls: (!m.tool_calls.is_empty()).then(|| {
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect()
                    }),
                    tool_call_id: m.tool_call_id.clone(),
                }
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn to_api_response_format(format: &ResponseFormat) -> serde_json::Value {
        match format {
            ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
            ResponseFormat::JsonSchema { name, schema, strict } => serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": strict },
            }),
        }
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        if let Some(format) = &request.response_format {
            body["response_format"] = Self::to_api_response_format(format);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body);
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                Err(ProviderError::RateLimited { retry_after_secs })
            }
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                })
            }
        }
    }
}

#[async_trait]
impl faceagent_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post(&body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let mut message = Message::assistant(choice.message.content.unwrap_or_default());
        message.tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    match state.apply(&data) {
                        Ok(Step::Continue(None)) => {}
                        Ok(Step::Continue(Some(chunk))) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Ok(Step::Finished(chunk)) => {
                            let _ = tx.send(Ok(chunk)).await;
                            return;
                        }
                        Ok(Step::Failed(e)) => {
                            warn!(provider = %provider_name, error = %e, "Provider reported an error mid-stream");
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                        Err(e) => {
                            trace!(provider = %provider_name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Body closed without [DONE]
            let _ = tx.send(state.end_of_body()).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- SSE decoding ---

/// Splits a byte stream into the payloads of `data:` lines.
///
/// Bytes are held until a full line arrives, so a UTF-8 sequence split
/// across two reads is decoded whole.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                out.push(data.trim().to_string());
            }
        }
        out
    }
}

enum Step {
    Continue(Option<StreamChunk>),
    Finished(StreamChunk),
    Failed(ProviderError),
}

/// Folds streamed deltas, assembling tool calls by their index.
#[derive(Default)]
struct StreamState {
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    finish_reason: Option<String>,
}

impl StreamState {
    fn apply(&mut self, data: &str) -> Result<Step, serde_json::Error> {
        // "[DONE]" signals end of stream
        if data == "[DONE]" {
            return Ok(Step::Finished(self.finish(None)));
        }

        let stream_resp: StreamResponse = serde_json::from_str(data)?;
        if let Some(error) = stream_resp.error {
            return Ok(Step::Failed(ProviderError::StreamInterrupted(format!(
                "provider error: {}",
                error.message
            ))));
        }

        let mut out = None;

        if let Some(choice) = stream_resp.choices.into_iter().next() {
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
            for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tool_calls.entry(tc_delta.index).or_default();
                if let Some(id) = tc_delta.id {
                    acc.id = id;
                }
                if let Some(func) = tc_delta.function {
                    if let Some(name) = func.name {
                        acc.name = name;
                    }
                    if let Some(args) = func.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }

            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out = Some(StreamChunk {
                    content: Some(content),
                    ..StreamChunk::default()
                });
            }
        }

        // Usage arrives in the last chunk when stream_options.include_usage is set
        if let Some(usage) = stream_resp.usage {
            let mut last = self.finish(Some(usage.into()));
            last.content = out.and_then(|chunk| chunk.content);
            return Ok(Step::Finished(last));
        }

        Ok(Step::Continue(out))
    }

    /// The body closed without `[DONE]`. That only counts as a completed
    /// turn when the model already reported why it stopped.
    fn end_of_body(&mut self) -> Result<StreamChunk, ProviderError> {
        match self.finish_reason {
            Some(_) => Ok(self.finish(None)),
            None => Err(ProviderError::StreamInterrupted(
                "response ended before the model finished".into(),
            )),
        }
    }

    fn finish(&mut self, usage: Option<Usage>) -> StreamChunk {
        let tool_calls = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(ToolCallAccumulator::into_tool_call)
            .collect();
        StreamChunk {
            content: None,
            tool_calls,
            done: true,
            usage,
        }
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> MessageToolCall {
        MessageToolCall {
            id: self.id,
            name: self.name,
            arguments: self.arguments,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

/// In-band error frame, e.g. `data: {"error":{"message":"..."}}`.
#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use faceagent_core::Provider;

    fn provider(base_url: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("test", base_url, "sk-test", Duration::from_secs(5)).unwrap()
    }

    /// Serves `body` from `/v1/chat/completions` on an ephemeral port.
    async fn serve(body: &'static str, content_type: &'static str) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { ([("content-type", content_type)], body) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let p = provider("https://api.openai.com/v1/");
        assert_eq!(p.base_url(), "https://api.openai.com/v1");
        assert_eq!(p.name(), "test");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn text_messages_convert_to_strings() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].content, Some(serde_json::json!("Hello")));
    }

    #[test]
    fn user_images_become_content_parts() {
        let msg = Message::user_with_images(
            "make it warmer",
            vec!["https://cdn/a.png".into(), "https://cdn/b.png".into()],
        );
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        let parts = api[0].content.as_ref().unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "make it warmer");
        assert_eq!(parts[2]["image_url"]["url"], "https://cdn/b.png");
    }

    #[test]
    fn tool_calling_assistant_message_has_null_content() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "generate".into(),
            arguments: r#"{"route":"t2i","intent":"a cat"}"#.into(),
        }];
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert!(api[0].content.is_none());
        let json = serde_json::to_value(&api[0]).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["function"]["name"], "generate");
    }

    #[test]
    fn tool_result_keeps_call_id() {
        let msg = Message::tool_result("call_1", r#"{"ok":true}"#);
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_includes_schema_format() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
            response_format: Some(ResponseFormat::JsonSchema {
                name: "elaboration".into(),
                schema: serde_json::json!({"type": "object"}),
                strict: true,
            }),
            stream: false,
        };
        let body = OpenAiCompatProvider::request_body(&request, false);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "elaboration");
        assert!(body.get("tools").is_none());
        assert!(body.get("stream_options").is_none());
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn sse_lines_split_across_reads() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\r\n\r\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(lines, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn multibyte_character_split_across_reads_survives() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café 🎨\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let emoji = line.iter().position(|b| *b == 0xF0).unwrap() + 2;

        let mut buf = SseLineBuffer::default();
        assert!(buf.push(&line[..split]).is_empty());
        assert!(buf.push(&line[split..emoji]).is_empty());
        let lines = buf.push(&line[emoji..]);

        let mut state = StreamState::default();
        let Step::Continue(Some(chunk)) = state.apply(&lines[0]).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(chunk.content.as_deref(), Some("café 🎨"));
    }

    #[test]
    fn in_band_error_frame_fails_the_stream() {
        let mut state = StreamState::default();
        state
            .apply(r#"{"choices":[{"delta":{"content":"partial"}}]}"#)
            .unwrap();
        let step = state
            .apply(r#"{"error":{"message":"The server had an error","type":"server_error","code":null}}"#)
            .unwrap();
        let Step::Failed(ProviderError::StreamInterrupted(message)) = step else {
            panic!("expected failure");
        };
        assert!(message.contains("The server had an error"));
    }

    #[test]
    fn body_end_without_finish_reason_is_interrupted() {
        let mut state = StreamState::default();
        state
            .apply(r#"{"choices":[{"delta":{"content":"half a sent"}}]}"#)
            .unwrap();
        assert!(matches!(state.end_of_body(), Err(ProviderError::StreamInterrupted(_))));

        let mut state = StreamState::default();
        state
            .apply(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        assert!(state.end_of_body().unwrap().done);
    }

    #[test]
    fn stream_state_assembles_tool_calls_in_index_order() {
        let mut state = StreamState::default();
        let deltas = [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"generate","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"generate","arguments":"{\"route\""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":\"t2i\"}"}}]}}]}"#,
        ];
        for d in deltas {
            assert!(matches!(state.apply(d).unwrap(), Step::Continue(None)));
        }
        let Step::Finished(chunk) = state.apply("[DONE]").unwrap() else {
            panic!("expected finish");
        };
        assert!(chunk.done);
        assert_eq!(chunk.tool_calls[0].id, "call_a");
        assert_eq!(chunk.tool_calls[0].arguments, r#"{"route":"t2i"}"#);
        assert_eq!(chunk.tool_calls[1].id, "call_b");
    }

    #[test]
    fn stream_state_emits_content_and_usage() {
        let mut state = StreamState::default();
        let Step::Continue(Some(chunk)) = state
            .apply(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#)
            .unwrap()
        else {
            panic!("expected content");
        };
        assert_eq!(chunk.content.as_deref(), Some("Hel"));
        assert!(matches!(
            state.apply(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap(),
            Step::Continue(None)
        ));
        let Step::Finished(last) = state
            .apply(r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#)
            .unwrap()
        else {
            panic!("expected finish");
        };
        assert_eq!(last.usage.unwrap().total_tokens, 15);
        assert!(state.apply("not json").is_err());
    }

    #[tokio::test]
    async fn complete_against_local_server() {
        let base = serve(
            r#"{"model":"gpt-4o-2024","choices":[{"message":{"role":"assistant","content":"{\"prompt\":\"x\",\"amount\":1,\"model\":\"gpt4o_image\"}"}}],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            "application/json",
        )
        .await;
        let response = provider(&base)
            .complete(ProviderRequest {
                model: "gpt-4o".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.0,
                max_tokens: None,
                tools: vec![],
                response_format: None,
                stream: false,
            })
            .await
            .unwrap();
        assert_eq!(response.model, "gpt-4o-2024");
        assert!(response.message.content.contains("gpt4o_image"));
        assert_eq!(response.usage.unwrap().total_tokens, 7);
    }

    #[tokio::test]
    async fn stream_against_local_server() {
        let base = serve(
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
                "data: [DONE]\n\n",
            ),
            "text/event-stream",
        )
        .await;
        let mut rx = provider(&base)
            .stream(ProviderRequest {
                model: "gpt-4o".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
                response_format: None,
                stream: true,
            })
            .await
            .unwrap();

        let mut text = String::new();
        let mut done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(c) = chunk.content {
                text.push_str(&c);
            }
            done |= chunk.done;
        }
        assert_eq!(text, "Hi there");
        assert!(done);
    }

    #[tokio::test]
    async fn truncated_stream_reports_error_after_partial_content() {
        let base = serve(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hal\"}}]}\n\n",
            "text/event-stream",
        )
        .await;
        let mut rx = provider(&base)
            .stream(ProviderRequest {
                model: "gpt-4o".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
                response_format: None,
                stream: true,
            })
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("Hal"));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(ProviderError::StreamInterrupted(_))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn non_200_maps_to_api_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::BAD_REQUEST, "bad model") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = provider(&format!("http://{addr}/v1"))
            .complete(ProviderRequest {
                model: "nope".into(),
                messages: vec![],
                temperature: 0.0,
                max_tokens: None,
                tools: vec![],
                response_format: None,
                stream: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 400, .. }));
    }
}
