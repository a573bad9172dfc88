//! # llmagent Core
//!
//! Domain types, traits, and error definitions for the llmagent framework.
//! Every other crate depends inward on this one; it has no HTTP, config
//! or CLI concerns of its own.
//!
//! ## Design Philosophy
//!
//! The LLM backend is a trait here, and everything that flows between agents
//! (chat documents, structured messages) is a plain value type. Implementations
//! live in their respective crates. This enables:
//! - Swapping LLM backends via configuration
//! - Easy testing with scripted providers
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod chat_document;
pub mod agent_message;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MessageError, ProviderError, Result};
pub use message::{Conversation, FunctionCall, Message, Role};
pub use provider::{FunctionDefinition, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use chat_document::{
    AgentInput, ChatDocAttachment, ChatDocMetaData, ChatDocument, Entity, ValidatorAttachment,
};
pub use agent_message::{AgentMessage, ThoughtQuestionAnswer, choose, seeded_rng};
