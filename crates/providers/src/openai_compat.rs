//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing `/v1/chat/completions`
//! with the `functions` / `function_call` fields (Azure, vLLM, Ollama, ...).
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Function calling, in both directions

use async_trait::async_trait;
use futures::StreamExt;
use llmagent_core::error::ProviderError;
use llmagent_core::message::{FunctionCall, Message, Role};
use llmagent_core::provider::*;
use serde::{Deserialize, Serialize};
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
    /// Create a new OpenAI-compatible provider with a 120s request timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Function => "function".into(),
                },
                content: Some(m.content.clone()),
                name: m.name.clone(),
                function_call: m.function_call.as_ref().map(|fc| ApiFunctionCall {
                    name: fc.name.clone(),
                    arguments: fc
                        .arguments
                        .as_ref()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "{}".into()),
                }),
            })
            .collect()
    }

    /// Convert function definitions to OpenAI API format.
    fn to_api_functions(functions: &[FunctionDefinition]) -> Vec<ApiFunctionDefinition> {
        functions
            .iter()
            .map(|f| ApiFunctionDefinition {
                name: f.name.clone(),
                description: f.description.clone(),
                parameters: f.parameters.clone(),
            })
            .collect()
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

        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(Self::to_api_functions(&request.functions));
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

/// Function-call arguments arrive as a JSON-encoded string. Anything that
/// does not parse is kept verbatim so the agent can report it back.
fn parse_arguments(raw: &str) -> Option<serde_json::Value> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string())))
}

#[async_trait]
impl llmagent_core::Provider for OpenAiCompatProvider {
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

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let mut message = Message::assistant(choice.message.content.unwrap_or_default());
        message.function_call = choice.message.function_call.map(|fc| FunctionCall {
            arguments: parse_arguments(&fc.arguments),
            name: fc.name,
        });

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
            cached: false,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut function_call = FunctionCallAccumulator::default();
            let mut usage = None;

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

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(function_call.finish(usage.take()))).await;
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(stream_resp) => {
                            if let Some(u) = stream_resp.usage {
                                usage = Some(Usage {
                                    prompt_tokens: u.prompt_tokens,
                                    completion_tokens: u.completion_tokens,
                                    total_tokens: u.total_tokens,
                                });
                            }

                            let Some(choice) = stream_resp.choices.into_iter().next() else {
                                continue;
                            };

                            if let Some(delta) = choice.delta.function_call {
                                function_call.push(delta);
                            }

                            if choice.delta.content.as_ref().is_some_and(|c| !c.is_empty()) {
                                let chunk = StreamChunk {
                                    content: choice.delta.content,
                                    function_call: None,
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(function_call.finish(usage))).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionDefinition {
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
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<StreamFunctionDelta>,
}

/// A function call delta. The name arrives first, arguments in fragments.
#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental function call deltas into a complete call.
#[derive(Debug, Default)]
struct FunctionCallAccumulator {
    name: String,
    arguments: String,
}

impl FunctionCallAccumulator {
    fn push(&mut self, delta: StreamFunctionDelta) {
        if let Some(name) = delta.name {
            self.name.push_str(&name);
        }
        if let Some(args) = delta.arguments {
            self.arguments.push_str(&args);
        }
    }

    fn to_function_call(&self) -> Option<FunctionCall> {
        if self.name.is_empty() {
            return None;
        }
        Some(FunctionCall {
            name: self.name.clone(),
            arguments: parse_arguments(&self.arguments),
        })
    }

    /// The terminating chunk of a stream.
    fn finish(&self, usage: Option<Usage>) -> StreamChunk {
        StreamChunk {
            content: None,
            function_call: self.to_function_call(),
            done: true,
            usage,
        }
    }
}

/// Splits an SSE byte stream into lines. Bytes are decoded only once a full
/// line has arrived, so a character split across network chunks survives.
#[derive(Debug, Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line[..end]);
        Some(text.trim_end_matches('\r').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmagent_core::Provider;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("local", "http://localhost:8000/v1/", "x");
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::function_result("python_version", "3.11"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[2].role, "function");
        assert_eq!(api_messages[2].name.as_deref(), Some("python_version"));
    }

    #[test]
    fn message_conversion_with_function_call() {
        let msg = Message::assistant("").with_function_call(FunctionCall::new(
            "file_exists",
            serde_json::json!({"filename": "setup.py"}),
        ));
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        let fc = api[0].function_call.as_ref().unwrap();
        assert_eq!(fc.name, "file_exists");
        let args: serde_json::Value = serde_json::from_str(&fc.arguments).unwrap();
        assert_eq!(args["filename"], "setup.py");
    }

    #[test]
    fn request_body_includes_functions() {
        let mut request = ProviderRequest::new("gpt-4", vec![Message::user("hi")]);
        request.max_tokens = Some(256);
        request.functions = vec![FunctionDefinition {
            name: "python_version".into(),
            description: "Find the python version".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = OpenAiCompatProvider::request_body(&request, false);
        assert_eq!(body["functions"][0]["name"], "python_version");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("stream_options").is_none());

        let streaming = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(streaming["stream"], true);
        assert_eq!(streaming["stream_options"]["include_usage"], true);
    }

    #[test]
    fn parse_response_with_function_call() {
        let data = r#"{
            "model": "gpt-4",
            "choices": [{"message": {"role": "assistant", "content": null,
                "function_call": {"name": "file_exists", "arguments": "{\"filename\": \"a.py\"}"}}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let fc = parsed.choices[0].message.function_call.as_ref().unwrap();
        assert_eq!(fc.name, "file_exists");
        assert_eq!(parse_arguments(&fc.arguments).unwrap()["filename"], "a.py");
    }

    #[test]
    fn unparseable_arguments_kept_verbatim() {
        assert_eq!(
            parse_arguments("{not json"),
            Some(serde_json::Value::String("{not json".into()))
        );
        assert_eq!(parse_arguments("  "), None);
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
        assert!(parsed.choices[0].finish_reason.is_none());
    }

    #[test]
    fn parse_stream_usage() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices.is_empty());
        assert_eq!(parsed.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn function_call_accumulator_assembly() {
        let mut acc = FunctionCallAccumulator::default();
        for data in [
            r#"{"choices":[{"delta":{"function_call":{"name":"file_exists","arguments":""}}}]}"#,
            r#"{"choices":[{"delta":{"function_call":{"arguments":"{\"filename\""}}}]}"#,
            r#"{"choices":[{"delta":{"function_call":{"arguments":": \"x.py\"}"}}}]}"#,
        ] {
            let parsed: StreamResponse = serde_json::from_str(data).unwrap();
            let delta = parsed.choices.into_iter().next().unwrap().delta;
            acc.push(delta.function_call.unwrap());
        }

        let chunk = acc.finish(None);
        assert!(chunk.done);
        let call = chunk.function_call.unwrap();
        assert_eq!(call.name, "file_exists");
        assert_eq!(call.arguments.unwrap()["filename"], "x.py");
    }

    #[test]
    fn empty_accumulator_has_no_call() {
        let acc = FunctionCallAccumulator::default();
        assert!(acc.finish(None).function_call.is_none());
    }

    #[test]
    fn sse_lines_keep_split_multibyte_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut lines = SseLines::default();
        lines.push(&line[..split]);
        assert!(lines.next_line().is_none());
        lines.push(&line[split..]);

        let data = lines.next_line().unwrap();
        assert!(data.contains("café"));
        assert!(!data.contains('\u{FFFD}'));
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn sse_lines_strip_carriage_returns() {
        let mut lines = SseLines::default();
        lines.push(b": keep-alive\r\ndata: [DONE]\r\n");
        assert_eq!(lines.next_line().unwrap(), ": keep-alive");
        assert_eq!(lines.next_line().unwrap(), "data: [DONE]");
        assert!(lines.next_line().is_none());
    }
}
