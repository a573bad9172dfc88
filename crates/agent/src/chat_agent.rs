//! `ChatAgent`: an agent backed by an LLM conversation.
//!
//! Holds the running message history, forwards pending content to the
//! provider, and dispatches structured requests the LLM emits to the
//! handlers registered with [`ChatAgent::enable_message`].

use crate::agent::{Agent, HumanInput};
use crate::handler::{MessageHandler, find_request, typed_handler};
use async_trait::async_trait;
use llmagent_config::AppConfig;
use llmagent_core::message::{Conversation, FunctionCall, Message};
use llmagent_core::provider::{FunctionDefinition, Provider, ProviderRequest};
use llmagent_core::{
    AgentInput, AgentMessage, ChatDocMetaData, ChatDocument, Entity, MessageError, Result,
    seeded_rng,
};
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, trace, warn};

/// Prompt shown to the human on each turn.
pub const HUMAN_PROMPT: &str =
    "Human (respond or q, x to exit current level, or hit enter to continue)";

/// Addressing prefix the LLM may use: `TO[Coder]: run the tests`.
static RECIPIENT_PREFIX: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r"^\s*TO\[([^\]]+)\]:\s*").ok());

/// Sampling settings for the agent's LLM calls.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl LlmSettings {
    pub fn from_config(config: &AppConfig, gpt4: bool) -> Self {
        Self {
            model: config.chat_model(gpt4).to_string(),
            temperature: config.llm.temperature,
            max_tokens: Some(config.llm.max_tokens),
            stream: config.llm.stream,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default(), false)
    }
}

#[derive(Debug, Clone)]
pub struct ChatAgentConfig {
    pub name: String,
    pub system_message: String,
    /// Opening message sent to the LLM when a run starts with nothing pending
    pub user_message: Option<String>,
    pub llm: LlmSettings,
    /// Seed for example selection in prompts; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl ChatAgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = message.into();
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for ChatAgentConfig {
    fn default() -> Self {
        Self {
            name: "LLM-Agent".into(),
            system_message: "You are a helpful assistant.".into(),
            user_message: None,
            llm: LlmSettings::default(),
            seed: None,
        }
    }
}

/// An agent that talks to an LLM and handles structured requests.
pub struct ChatAgent {
    config: ChatAgentConfig,
    provider: Option<Arc<dyn Provider>>,
    conversation: Conversation,
    handlers: HashMap<String, MessageHandler>,
    functions: Vec<FunctionDefinition>,
    instructions: Vec<String>,
    human: Option<Box<dyn HumanInput>>,
    rng: StdRng,
    /// Function whose result the next LLM turn should report
    pending_function: Option<String>,
}

impl ChatAgent {
    pub fn new(config: ChatAgentConfig) -> Self {
        let mut conversation = Conversation::new();
        conversation.set_system(config.system_message.clone());
        Self {
            rng: seeded_rng(config.seed),
            config,
            provider: None,
            conversation,
            handlers: HashMap::new(),
            functions: Vec::new(),
            instructions: Vec::new(),
            human: None,
            pending_function: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_human_input(mut self, human: Box<dyn HumanInput>) -> Self {
        self.human = Some(human);
        self
    }

    pub fn config(&self) -> &ChatAgentConfig {
        &self.config
    }

    /// Accept structured messages of type `M`, answering them with `handler`.
    ///
    /// The message's instructions are appended to the system prompt and its
    /// function definition is offered to the LLM.
    pub fn enable_message<M, F>(&mut self, handler: F) -> std::result::Result<(), MessageError>
    where
        M: AgentMessage,
        F: Fn(M) -> String + Send + Sync + 'static,
    {
        let instructions = M::instructions(&mut self.rng)?;
        let description = M::examples()
            .first()
            .and_then(|ex| ex.use_when().into_iter().next())
            .unwrap_or_default();
        let function = FunctionDefinition {
            name: M::REQUEST.to_string(),
            description,
            parameters: M::parameters_schema()?,
        };

        debug!(agent = %self.config.name, request = M::REQUEST, "Enabled message");
        self.handlers
            .insert(M::REQUEST.to_string(), typed_handler::<M, F>(handler));
        self.functions.retain(|f| f.name != M::REQUEST);
        self.functions.push(function);
        self.instructions.push(instructions);
        self.refresh_system_prompt();
        Ok(())
    }

    /// Whether a handler is registered for `request`.
    pub fn handles(&self, request: &str) -> bool {
        self.handlers.contains_key(request)
    }

    /// The system prompt sent to the LLM, including message instructions.
    pub fn system_prompt(&self) -> String {
        if self.instructions.is_empty() {
            return self.config.system_message.clone();
        }
        format!(
            "{}\n\nYou can make the following structured requests.\n\n{}",
            self.config.system_message,
            self.instructions.join("\n\n")
        )
    }

    /// Full message history, system message first.
    pub fn history(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// Forget every turn but keep the system prompt.
    pub fn clear_history(&mut self) {
        self.conversation.clear_turns();
        self.pending_function = None;
    }

    fn refresh_system_prompt(&mut self) {
        let prompt = self.system_prompt();
        self.conversation.set_system(prompt);
    }

    fn agent_doc(&self, content: impl Into<String>) -> ChatDocument {
        ChatDocument::new(
            content,
            ChatDocMetaData::new(Entity::Agent, Entity::Agent)
                .with_sender_name(self.config.name.clone()),
        )
    }

    /// Append the incoming content to the history as the next turn.
    fn record_incoming(&mut self, msg: Option<&AgentInput>) {
        let content = match msg {
            Some(input) => input.content().to_string(),
            None => match &self.config.user_message {
                Some(opening) if self.conversation.len() <= 1 => opening.clone(),
                _ => String::new(),
            },
        };

        let from_agent = msg
            .and_then(AgentInput::as_document)
            .is_some_and(|d| d.metadata.source == Entity::Agent);
        match self.pending_function.take() {
            Some(name) if from_agent => {
                self.conversation.push(Message::function_result(name, content));
            }
            _ if !content.trim().is_empty() => {
                self.conversation.push(Message::user(content));
            }
            _ => {}
        }
    }

    async fn call_llm(&self, provider: &dyn Provider) -> Result<Message> {
        let mut request = ProviderRequest::new(
            self.config.llm.model.clone(),
            self.conversation.messages.clone(),
        );
        request.temperature = self.config.llm.temperature;
        request.max_tokens = self.config.llm.max_tokens;
        request.functions = self.functions.clone();
        request.stream = self.config.llm.stream;

        debug!(
            agent = %self.config.name,
            provider = provider.name(),
            messages = request.messages.len(),
            stream = request.stream,
            "Calling LLM"
        );

        if !request.stream {
            let response = provider.complete(request).await?;
            if response.cached {
                debug!(agent = %self.config.name, "LLM response served from cache");
            }
            return Ok(response.message);
        }

        let mut rx = provider.stream(request).await?;
        let mut content = String::new();
        let mut function_call: Option<FunctionCall> = None;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = &chunk.content {
                trace!(delta = %delta, "Stream chunk");
                content.push_str(delta);
            }
            if chunk.function_call.is_some() {
                function_call = chunk.function_call;
            }
            if chunk.done {
                break;
            }
        }

        let mut message = Message::assistant(content);
        message.function_call = function_call;
        Ok(message)
    }

    fn dispatch(&self, request: &str, args: serde_json::Value) -> Option<ChatDocument> {
        let handler = self.handlers.get(request)?;
        let doc = match handler(args) {
            Ok(reply) => {
                debug!(agent = %self.config.name, request, "Handled structured request");
                self.agent_doc(reply)
            }
            Err(e) => {
                warn!(agent = %self.config.name, request, error = %e, "Malformed structured request");
                self.agent_doc(format!(
                    "Your `{request}` request could not be processed: {e}. \
                     Please resend it as a single JSON object in the format shown earlier."
                ))
            }
        };
        Some(doc)
    }
}

/// Split a leading `TO[name]:` prefix off LLM output.
pub fn parse_recipient(content: &str) -> (String, String) {
    match RECIPIENT_PREFIX.as_ref().and_then(|re| re.captures(content)) {
        Some(caps) => {
            let recipient = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let rest = content[caps.get(0).map_or(0, |m| m.end())..].to_string();
            (recipient, rest)
        }
        None => (String::new(), content.to_string()),
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn has_human_input(&self) -> bool {
        self.human.is_some()
    }

    async fn user_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        let Some(human) = self.human.as_mut() else {
            return Ok(None);
        };

        let prompt = match msg.and_then(AgentInput::as_document) {
            Some(doc) if doc.metadata.source != Entity::User && !doc.content.is_empty() => {
                let from = if doc.metadata.sender_name.is_empty() {
                    doc.metadata.source.to_string()
                } else {
                    doc.metadata.sender_name.clone()
                };
                format!("{from}: {}\n\n{HUMAN_PROMPT}", doc.content)
            }
            _ => HUMAN_PROMPT.to_string(),
        };

        let reply = human.read_line(&prompt).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(None);
        }

        Ok(Some(ChatDocument::from_user(reply)))
    }

    async fn llm_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        let Some(provider) = self.provider.clone() else {
            return Ok(None);
        };

        self.record_incoming(msg);
        let reply = self.call_llm(provider.as_ref()).await?;
        self.conversation.push(reply.clone());

        let (recipient, content) = parse_recipient(&reply.content);
        let metadata = ChatDocMetaData::new(Entity::Llm, Entity::Llm)
            .with_sender_name(self.config.name.clone())
            .with_recipient(recipient);

        Ok(Some(
            ChatDocument::new(content, metadata)
                .with_function_call(reply.function_call)
                .with_attachment(msg.and_then(AgentInput::attachment).cloned()),
        ))
    }

    async fn agent_response(&mut self, msg: Option<&AgentInput>) -> Result<Option<ChatDocument>> {
        let Some(msg) = msg else {
            return Ok(None);
        };

        if let Some(call) = msg.function_call() {
            if !self.handles(&call.name) {
                return Ok(None);
            }
            let args = call
                .arguments
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));
            self.pending_function = Some(call.name.clone());
            return Ok(self.dispatch(&call.name, args));
        }

        match find_request(msg.content()) {
            Some((request, value)) => Ok(self.dispatch(&request, value)),
            None => Ok(None),
        }
    }

    fn set_system_message(&mut self, message: &str) {
        self.config.system_message = message.to_string();
        self.refresh_system_prompt();
    }
}
