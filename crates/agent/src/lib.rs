//! Agents and the task loop for llmagent.
//!
//! A [`Task`] repeatedly offers the pending [`ChatDocument`] to its agent's
//! responders and to its sub-tasks:
//!
//! 1. **User**: a human, when the agent has an input source
//! 2. **LLM**: the agent's language model
//! 3. **Agent**: the agent's own code (structured requests, validation)
//! 4. **Sub-tasks**: other agents this one delegates to
//!
//! The first valid response becomes the next pending message. Messages are
//! routed by their `recipient`; a [`ValidatorAgent`] sub-task repairs LLM
//! output that forgot to name one.
//!
//! [`ChatDocument`]: llmagent_core::ChatDocument

pub mod agent;
pub mod chat_agent;
pub mod handler;
pub mod task;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, HumanInput, ScriptedInput};
pub use chat_agent::{ChatAgent, ChatAgentConfig, HUMAN_PROMPT, LlmSettings, parse_recipient};
pub use handler::{MessageHandler, extract_json_object, typed_handler};
pub use task::{DONE, Task};
pub use validator::{ValidatorAgent, ValidatorAgentConfig};
