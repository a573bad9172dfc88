//! The responder interface shared by every agent, plus the human input seam.

use async_trait::async_trait;
use llmagent_core::{AgentInput, ChatDocument, Result};
use std::collections::VecDeque;

/// A participant in a task loop.
///
/// Each hook returns `Ok(None)` when that responder has nothing to say about
/// the pending message, which lets the task move on to the next one.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name other agents use to address this one.
    fn name(&self) -> &str;

    /// Ask the human for the next message.
    async fn user_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>>;

    /// Ask the LLM for the next message.
    async fn llm_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>>;

    /// Let the agent's own code handle the message (structured requests,
    /// validation, ...).
    async fn agent_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>>;

    /// Replace the agent's system message. Agents without an LLM ignore this.
    fn set_system_message(&mut self, _message: &str) {}

    /// Whether a human is attached. A task keeps asking them after they pass.
    fn has_human_input(&self) -> bool {
        false
    }
}

/// Source of human replies for `user_response`.
#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Show `prompt` and read one line of input.
    async fn read_line(&mut self, prompt: &str) -> Result<String>;
}

/// Replays a fixed list of replies; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    replies: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

#[async_trait]
impl HumanInput for ScriptedInput {
    async fn read_line(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_string());
        self.replies
            .pop_front()
            .ok_or_else(|| llmagent_core::Error::Input("scripted input exhausted".into()))
    }
}
