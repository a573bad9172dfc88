//! Shared test helpers for agent and task tests.

use llmagent_core::error::ProviderError;
use llmagent_core::message::{FunctionCall, Message};
use llmagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider answering each call with the next text in `texts`.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();

        if count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                count,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[count].clone())
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        cached: false,
    }
}

/// Create a response carrying a native function call.
pub fn make_function_call_response(name: &str, args: serde_json::Value) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.function_call = Some(FunctionCall::new(name, args));
    response
}

/// A structured message used across the agent tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileExistsMessage {
    pub request: String,
    pub filename: String,
    #[serde(default)]
    pub result: String,
}

impl FileExistsMessage {
    pub fn new(filename: &str, result: &str) -> Self {
        Self {
            request: "file_exists".into(),
            filename: filename.into(),
            result: result.into(),
        }
    }
}

impl llmagent_core::AgentMessage for FileExistsMessage {
    const REQUEST: &'static str = "file_exists";

    fn request(&self) -> &str {
        &self.request
    }

    fn result(&self) -> &str {
        &self.result
    }

    fn examples() -> Vec<Self> {
        vec![
            Self::new("requirements.txt", "yes"),
            Self::new("Dockerfile", "no"),
        ]
    }

    fn use_when(&self) -> Vec<String> {
        vec![format!("I need to check whether {} exists.", self.filename)]
    }
}
