//! `ValidatorAgent` checks that LLM output names a recipient.
//!
//! Sits as a sub-task of the agent whose LLM output it polices. A message
//! with a recipient passes untouched. A tool-call-like message is routed to
//! the tool recipient. Anything else is parked in an attachment while the
//! LLM is asked who it was meant for; the answer restores the original
//! content with the chosen recipient.

use crate::agent::Agent;
use async_trait::async_trait;
use llmagent_config::ValidatorConfig;
use llmagent_core::{
    AgentInput, ChatDocAttachment, ChatDocMetaData, ChatDocument, Entity, Error, Result,
};
use tracing::{debug, warn};

/// Validated validator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorAgentConfig {
    name: String,
    recipients: Vec<String>,
    tool_recipient: String,
    tool_marker: String,
}

impl ValidatorAgentConfig {
    pub const DEFAULT_NAME: &'static str = "Validator";
    pub const DEFAULT_TOOL_MARKER: &'static str = "TOOL";

    /// Fails when `recipients` is empty or contains a blank name, or when
    /// `tool_recipient` is blank.
    pub fn new<I, S>(recipients: I, tool_recipient: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let recipients: Vec<String> = recipients.into_iter().map(Into::into).collect();
        let tool_recipient = tool_recipient.into();

        if recipients.is_empty() {
            return Err(config_error("validator needs at least one recipient"));
        }
        if recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(config_error("validator recipients must not be blank"));
        }
        if tool_recipient.trim().is_empty() {
            return Err(config_error("validator tool_recipient must not be blank"));
        }

        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            recipients,
            tool_recipient,
            tool_marker: Self::DEFAULT_TOOL_MARKER.to_string(),
        })
    }

    pub fn from_config(config: &ValidatorConfig) -> Result<Self> {
        Self::new(config.recipients.clone(), config.tool_recipient.clone())?
            .with_name(config.name.clone())?
            .with_tool_marker(config.tool_marker.clone())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(config_error("validator name must not be blank"));
        }
        self.name = name;
        Ok(self)
    }

    pub fn with_tool_marker(mut self, marker: impl Into<String>) -> Result<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(config_error("validator tool_marker must not be empty"));
        }
        self.tool_marker = marker;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn tool_recipient(&self) -> &str {
        &self.tool_recipient
    }

    pub fn tool_marker(&self) -> &str {
        &self.tool_marker
    }

    /// The question asked when a message has no recipient.
    pub fn clarification_prompt(&self) -> String {
        let quoted: Vec<String> = self.recipients.iter().map(|r| format!("\"{r}\"")).collect();
        let (question, answer) = match self.recipients.as_slice() {
            [only] => (only.clone(), quoted.join("")),
            [rest @ .., last] => {
                let options = if rest.len() == 1 {
                    rest[0].clone()
                } else {
                    rest.join(", ")
                };
                let head = &quoted[..quoted.len() - 1];
                (
                    format!("{options}, or for {last}"),
                    format!("{} or {}", head.join(", "), quoted[quoted.len() - 1]),
                )
            }
            [] => (String::new(), String::new()),
        };
        format!("Is this message for {question}?\nPlease simply respond with {answer}")
    }
}

fn config_error(message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
    }
}

/// Agent that repairs messages missing a recipient.
#[derive(Debug, Clone)]
pub struct ValidatorAgent {
    config: ValidatorAgentConfig,
}

impl ValidatorAgent {
    pub fn new(config: ValidatorAgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorAgentConfig {
        &self.config
    }

    fn agent_metadata(&self) -> ChatDocMetaData {
        ChatDocMetaData::new(Entity::Agent, Entity::Agent)
    }

    /// The corrected document for `msg`, or `None` when it already has a recipient.
    pub fn validate(&self, msg: &ChatDocument) -> Option<ChatDocument> {
        if !msg.metadata.recipient.is_empty() {
            return None;
        }

        if msg.function_call.is_some() || msg.content.contains(&self.config.tool_marker) {
            debug!(recipient = %self.config.tool_recipient, "Routing tool call");
            let metadata = self
                .agent_metadata()
                .with_recipient(self.config.tool_recipient.clone())
                .with_parent_responder(Entity::Llm);
            return Some(
                ChatDocument::new(msg.content.clone(), metadata)
                    .with_function_call(msg.function_call.clone()),
            );
        }

        if let Some(recipient) = self.config.recipients.iter().find(|r| **r == msg.content) {
            let content = match msg.attachment.as_ref().and_then(ChatDocAttachment::as_validator) {
                Some(saved) => saved.content.clone(),
                None => {
                    warn!(
                        validator = %self.config.name,
                        "Clarified recipient but no saved content to restore"
                    );
                    String::new()
                }
            };
            debug!(recipient = %recipient, "Recipient clarified");
            let metadata = self
                .agent_metadata()
                .with_recipient(recipient.clone())
                .with_parent_responder(Entity::Llm);
            return Some(ChatDocument::new(content, metadata));
        }

        debug!(validator = %self.config.name, "No recipient; asking for clarification");
        let metadata = self.agent_metadata().with_sender_name(self.config.name.clone());
        Some(
            ChatDocument::new(self.config.clarification_prompt(), metadata)
                .with_attachment(Some(ChatDocAttachment::validator(msg.content.clone()))),
        )
    }
}

#[async_trait]
impl Agent for ValidatorAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn user_response(&mut self, _msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        Ok(None)
    }

    async fn llm_response(&mut self, _msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        Ok(None)
    }

    async fn agent_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        Ok(msg
            .and_then(AgentInput::as_document)
            .and_then(|doc| self.validate(doc)))
    }
}
