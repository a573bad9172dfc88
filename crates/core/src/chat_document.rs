//! Chat documents: the envelope passed between responders in a task.
//!
//! Every responder turn produces one `ChatDocument`. The task loop owns it
//! for the turn, uses its metadata to pick the next responder, and drops it
//! once the loop moves on.

use serde::{Deserialize, Serialize};
use crate::message::FunctionCall;

/// Routing tag for the originator or responder of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    User,
    Llm,
    Agent,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Entity::User => "User",
            Entity::Llm => "LLM",
            Entity::Agent => "Agent",
        };
        f.write_str(s)
    }
}

/// Routing metadata attached to every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDocMetaData {
    /// Entity that produced the content
    pub source: Entity,

    /// Entity that sent the document on
    pub sender: Entity,

    /// Name of the sending agent (empty when anonymous)
    #[serde(default)]
    pub sender_name: String,

    /// Intended recipient name (empty when unaddressed)
    #[serde(default)]
    pub recipient: String,

    /// Entity the task loop should attribute this document to, when it
    /// differs from whoever actually produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_responder: Option<Entity>,
}

impl ChatDocMetaData {
    pub fn new(source: Entity, sender: Entity) -> Self {
        Self {
            source,
            sender,
            sender_name: String::new(),
            recipient: String::new(),
            parent_responder: None,
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn with_parent_responder(mut self, responder: Entity) -> Self {
        self.parent_responder = Some(responder);
        self
    }
}

impl Default for ChatDocMetaData {
    fn default() -> Self {
        Self::new(Entity::User, Entity::User)
    }
}

/// Original content parked by the validator while it asks for clarification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorAttachment {
    pub content: String,
}

/// Side-channel payload carried by a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatDocAttachment {
    Validator(ValidatorAttachment),
    Data { value: serde_json::Value },
}

impl ChatDocAttachment {
    pub fn validator(content: impl Into<String>) -> Self {
        Self::Validator(ValidatorAttachment {
            content: content.into(),
        })
    }

    /// The parked validator content, if this is a validator attachment.
    pub fn as_validator(&self) -> Option<&ValidatorAttachment> {
        match self {
            Self::Validator(v) => Some(v),
            Self::Data { .. } => None,
        }
    }
}

/// One turn's message, as exchanged between agents and the task loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDocument {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<ChatDocAttachment>,

    pub metadata: ChatDocMetaData,
}

impl ChatDocument {
    pub fn new(content: impl Into<String>, metadata: ChatDocMetaData) -> Self {
        Self {
            content: content.into(),
            function_call: None,
            attachment: None,
            metadata,
        }
    }

    /// A document typed by the human user.
    pub fn from_user(content: impl Into<String>) -> Self {
        Self::new(content, ChatDocMetaData::new(Entity::User, Entity::User))
    }

    pub fn with_function_call(mut self, call: Option<FunctionCall>) -> Self {
        self.function_call = call;
        self
    }

    pub fn with_attachment(mut self, attachment: Option<ChatDocAttachment>) -> Self {
        self.attachment = attachment;
        self
    }

    /// A document is a usable response when it says something or calls something.
    pub fn is_valid(&self) -> bool {
        !self.content.trim().is_empty() || self.function_call.is_some()
    }
}

/// What a responder receives: free text, or a full document with metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    RawText(String),
    Document(ChatDocument),
}

impl AgentInput {
    pub fn content(&self) -> &str {
        match self {
            Self::RawText(text) => text,
            Self::Document(doc) => &doc.content,
        }
    }

    pub fn as_document(&self) -> Option<&ChatDocument> {
        match self {
            Self::RawText(_) => None,
            Self::Document(doc) => Some(doc),
        }
    }

    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.as_document().and_then(|d| d.function_call.as_ref())
    }

    pub fn attachment(&self) -> Option<&ChatDocAttachment> {
        self.as_document().and_then(|d| d.attachment.as_ref())
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::RawText(text.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self::RawText(text)
    }
}

impl From<ChatDocument> for AgentInput {
    fn from(doc: ChatDocument) -> Self {
        Self::Document(doc)
    }
}
