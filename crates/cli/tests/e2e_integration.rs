//! End-to-end tests for multi-agent tasks.
//!
//! A planner agent delegates to expert sub-tasks. Its LLM output is checked
//! by a validator sub-task, which asks for a recipient when none is given
//! and routes function calls to the tool recipient.

use std::sync::{Arc, Mutex};

use llmagent_agent::{ChatAgent, ChatAgentConfig, LlmSettings, Task, ValidatorAgent, ValidatorAgentConfig};
use llmagent_core::error::ProviderError;
use llmagent_core::message::{FunctionCall, Message, Role};
use llmagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use llmagent_core::{AgentMessage, ChatDocument};
use serde::{Deserialize, Serialize};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| text_response(t)).collect())
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, idx: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[idx].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();
        if count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                count,
                responses.len()
            );
        }
        requests.push(request);
        Ok(responses[count].clone())
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
        cached: false,
    }
}

fn function_call_response(name: &str, args: serde_json::Value) -> ProviderResponse {
    let mut response = text_response("");
    response.message.function_call = Some(FunctionCall::new(name, args));
    response
}

// ── Structured message ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunTestsMessage {
    request: String,
    path: String,
    #[serde(default)]
    result: String,
}

impl AgentMessage for RunTestsMessage {
    const REQUEST: &'static str = "run_tests";

    fn request(&self) -> &str {
        &self.request
    }

    fn result(&self) -> &str {
        &self.result
    }

    fn examples() -> Vec<Self> {
        vec![Self {
            request: Self::REQUEST.into(),
            path: "tests/".into(),
            result: "12 passed, 0 failed".into(),
        }]
    }

    fn use_when(&self) -> Vec<String> {
        vec![
            format!("I need to run the tests under {}.", self.path),
            "I want to know whether the test suite passes.".into(),
        ]
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────

fn llm_agent(name: &str, provider: Arc<ScriptedProvider>) -> ChatAgent {
    let llm = LlmSettings {
        stream: false,
        ..LlmSettings::default()
    };
    ChatAgent::new(ChatAgentConfig::new(name).with_llm(llm).with_seed(42)).with_provider(provider)
}

fn coder(provider: Arc<ScriptedProvider>) -> Task {
    let mut agent = llm_agent("Coder", provider);
    agent
        .enable_message(|m: RunTestsMessage| format!("ran {}: 12 passed, 0 failed", m.path))
        .unwrap();
    Task::new(agent).llm_delegate(true)
}

fn planner_task(
    planner: Arc<ScriptedProvider>,
    docker: Arc<ScriptedProvider>,
    coder_llm: Arc<ScriptedProvider>,
) -> Task {
    let validator =
        ValidatorAgent::new(ValidatorAgentConfig::new(["DockerExpert", "Coder"], "Coder").unwrap());

    Task::new(llm_agent("Planner", planner))
        .llm_delegate(true)
        .with_user_message("Find out whether this repo's tests pass.")
        .add_sub_task(Task::new(validator).single_round(true))
        .add_sub_task(Task::new(llm_agent("DockerExpert", docker)).single_round(true))
        .add_sub_task(coder(coder_llm))
}

// ── E2E: validator clarification ─────────────────────────────────────────

#[tokio::test]
async fn e2e_ambiguous_request_is_clarified_and_delegated() {
    let planner = Arc::new(ScriptedProvider::texts(&[
        "run the tests",
        "Coder",
        "DONE: all 12 tests pass",
    ]));
    let coder_llm = Arc::new(ScriptedProvider::texts(&[
        r#"{"request": "run_tests", "path": "tests/"}"#,
        "DONE 12 passed",
    ]));
    let docker = Arc::new(ScriptedProvider::texts(&[]));

    let mut task = planner_task(planner.clone(), docker.clone(), coder_llm.clone());
    let result = task.run(None).await.unwrap().unwrap();

    assert_eq!(result.content, "all 12 tests pass");
    assert_eq!(planner.calls(), 3);
    assert_eq!(docker.calls(), 0);
    assert_eq!(coder_llm.calls(), 2);

    // The planner was asked who the message was for.
    let clarify = planner.request(1);
    assert_eq!(
        clarify.messages.last().unwrap().content,
        "Is this message for DockerExpert, or for Coder?\n\
         Please simply respond with \"DockerExpert\" or \"Coder\""
    );

    // The coder received the original content, then its handler's output.
    let first = coder_llm.request(0);
    assert_eq!(first.messages.last().unwrap().content, "run the tests");
    assert!(first.messages[0].content.contains("## `run_tests`"));
    assert_eq!(first.functions[0].name, "run_tests");
    let second = coder_llm.request(1);
    assert_eq!(
        second.messages.last().unwrap().content,
        "ran tests/: 12 passed, 0 failed"
    );

    // The planner saw the coder's final answer.
    assert_eq!(planner.request(2).messages.last().unwrap().content, "12 passed");
}

// ── E2E: tool-call routing ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_function_call_routed_to_tool_recipient() {
    let planner = Arc::new(ScriptedProvider::new(vec![
        function_call_response("run_tests", serde_json::json!({"path": "tests/unit"})),
        text_response("DONE unit tests pass"),
    ]));
    let coder_llm = Arc::new(ScriptedProvider::texts(&["DONE unit tests: 12 passed"]));
    let docker = Arc::new(ScriptedProvider::texts(&[]));

    let mut task = planner_task(planner.clone(), docker.clone(), coder_llm.clone());
    let result = task.run(None).await.unwrap().unwrap();

    assert_eq!(result.content, "unit tests pass");
    assert_eq!(planner.calls(), 2);
    assert_eq!(docker.calls(), 0);

    // The coder executed the call and reported the result as a function turn.
    let coder_request = coder_llm.request(0);
    let last = coder_request.messages.last().unwrap();
    assert_eq!(last.role, Role::Function);
    assert_eq!(last.name.as_deref(), Some("run_tests"));
    assert_eq!(last.content, "ran tests/unit: 12 passed, 0 failed");

    assert_eq!(
        planner.request(1).messages.last().unwrap().content,
        "unit tests: 12 passed"
    );
}

// ── E2E: explicit addressing skips the validator ─────────────────────────

#[tokio::test]
async fn e2e_addressed_message_goes_straight_to_expert() {
    let planner = Arc::new(ScriptedProvider::texts(&[
        "TO[DockerExpert]: which base image is used?",
        "DONE python:3.11-slim",
    ]));
    let docker = Arc::new(ScriptedProvider::texts(&["The Dockerfile uses python:3.11-slim."]));
    let coder_llm = Arc::new(ScriptedProvider::texts(&[]));

    let mut task = planner_task(planner.clone(), docker.clone(), coder_llm.clone());
    let result = task.run(None).await.unwrap().unwrap();

    assert_eq!(result.content, "python:3.11-slim");
    assert_eq!(docker.calls(), 1);
    assert_eq!(coder_llm.calls(), 0);
    assert_eq!(
        docker.request(0).messages.last().unwrap().content,
        "which base image is used?"
    );
}

// ── E2E: malformed structured request ────────────────────────────────────

#[tokio::test]
async fn e2e_malformed_request_gets_corrected() {
    let coder_llm = Arc::new(ScriptedProvider::texts(&[
        r#"{"request": "run_tests"}"#,
        r#"{"request": "run_tests", "path": "tests/"}"#,
        "DONE 12 passed",
    ]));
    let mut task = coder(coder_llm.clone());

    let result = task
        .run(Some(ChatDocument::from_user("Please run the tests.")))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.content, "12 passed");
    let correction = coder_llm.request(1);
    assert!(
        correction
            .messages
            .last()
            .unwrap()
            .content
            .contains("could not be processed")
    );
}
