//! Message and Conversation domain types.
//!
//! These are the role-tagged turns exchanged with the LLM:
//! an agent appends turns to its conversation, the provider sends the whole
//! conversation to the model and returns one assistant turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user, or another agent speaking on the user's side
    User,
    /// The LLM
    Assistant,
    /// System instructions
    System,
    /// Output of a function the assistant called
    Function,
}

/// A structured call emitted through the model's function-calling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function (the request the model wants performed)
    pub name: String,

    /// Arguments as a JSON object, if the model supplied any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Function name, set on `Role::Function` results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Function call requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            name: None,
            function_call: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a function result message.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Function, content);
        msg.name = Some(name.into());
        msg
    }

    /// Attach a function call to this message.
    pub fn with_function_call(mut self, call: FunctionCall) -> Self {
        self.function_call = Some(call);
        self
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    /// Ordered messages
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the leading system message, inserting one if absent.
    pub fn set_system(&mut self, content: impl Into<String>) {
        let system = Message::system(content);
        match self.messages.first() {
            Some(first) if first.role == Role::System => self.messages[0] = system,
            _ => self.messages.insert(0, system),
        }
    }

    /// Drop everything except the system message.
    pub fn clear_turns(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.function_call.is_none());
    }

    #[test]
    fn function_result_carries_name() {
        let msg = Message::function_result("python_version", "3.11");
        assert_eq!(msg.role, Role::Function);
        assert_eq!(msg.name.as_deref(), Some("python_version"));
    }

    #[test]
    fn set_system_replaces_existing() {
        let mut conv = Conversation::new();
        conv.set_system("first");
        conv.push(Message::user("hi"));
        conv.set_system("second");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages[0].content, "second");
        assert_eq!(conv.messages[0].role, Role::System);
    }

    #[test]
    fn clear_turns_keeps_system_prompt() {
        let mut conv = Conversation::new();
        conv.set_system("You are helpful");
        conv.push(Message::user("one"));
        conv.push(Message::assistant("two"));
        conv.clear_turns();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages[0].content, "You are helpful");
    }

    #[test]
    fn function_call_skips_missing_arguments() {
        let call = FunctionCall {
            name: "list_files".into(),
            arguments: None,
        };
        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(json, r#"{"name":"list_files"}"#);
    }
}
