//! The task loop. Drives an agent (and its sub-tasks) turn by turn.
//!
//! Each step offers the pending message to the responders in a fixed order:
//! the human, the LLM, the agent's own code, then each sub-task. The first
//! valid response becomes the new pending message. The loop ends when a
//! step produces nothing and no human was asked, on `DONE` from a delegating
//! LLM, when the human quits, after a single round if requested, or at the
//! turn limit.

use crate::agent::Agent;
use futures::future::BoxFuture;
use llmagent_config::TaskConfig;
use llmagent_core::{AgentInput, ChatDocument, Entity, Result};
use tracing::{debug, info};

/// Prefix a delegating LLM uses to end its task.
pub const DONE: &str = "DONE";

/// Human replies that end the current task.
const QUIT_COMMANDS: [&str; 2] = ["q", "x"];

/// Who answered a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Responder {
    Entity(Entity),
    SubTask(usize),
}

const ENTITY_ORDER: [Entity; 3] = [Entity::User, Entity::Llm, Entity::Agent];

/// A unit of work: one agent, its settings, and the tasks it may delegate to.
pub struct Task {
    agent: Box<dyn Agent>,
    name: String,
    sub_tasks: Vec<Task>,
    llm_delegate: bool,
    single_round: bool,
    only_user_quits: bool,
    max_turns: usize,
    user_message: Option<String>,
}

impl Task {
    pub fn new(agent: impl Agent + 'static) -> Self {
        let name = agent.name().to_string();
        Self {
            agent: Box::new(agent),
            name,
            sub_tasks: Vec::new(),
            llm_delegate: false,
            single_round: false,
            only_user_quits: false,
            max_turns: TaskConfig::default().max_turns,
            user_message: None,
        }
    }

    pub fn with_config(mut self, config: &TaskConfig) -> Self {
        self.max_turns = config.max_turns;
        self
    }

    /// Name sub-task recipients are matched against. Defaults to the agent's name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The LLM drives the task and ends it by replying `DONE ...`.
    pub fn llm_delegate(mut self, enabled: bool) -> Self {
        self.llm_delegate = enabled;
        self
    }

    /// Return after the first response.
    pub fn single_round(mut self, enabled: bool) -> Self {
        self.single_round = enabled;
        self
    }

    /// Ignore `DONE` and `single_round`; only the human or the turn limit ends the task.
    pub fn only_user_quits(mut self, enabled: bool) -> Self {
        self.only_user_quits = enabled;
        self
    }

    pub fn max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns;
        self
    }

    /// Override the agent's system message.
    pub fn with_system_message(mut self, message: &str) -> Self {
        self.agent.set_system_message(message);
        self
    }

    /// Message to start with when `run` is given nothing.
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn add_sub_task(mut self, task: Task) -> Self {
        self.sub_tasks.push(task);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    /// Run until a termination condition; returns the last message produced,
    /// or `None` if nobody responded.
    pub fn run(&mut self, initial: Option<ChatDocument>) -> BoxFuture<'_, Result<Option<ChatDocument>>> {
        Box::pin(self.run_loop(initial))
    }

    async fn run_loop(&mut self, initial: Option<ChatDocument>) -> Result<Option<ChatDocument>> {
        info!(task = %self.name, sub_tasks = self.sub_tasks.len(), "Task started");

        let mut pending = initial.or_else(|| self.user_message.clone().map(ChatDocument::from_user));
        let mut producer: Option<Responder> = None;
        let mut result: Option<ChatDocument> = None;
        let mut turns = 0;

        loop {
            if turns >= self.max_turns {
                info!(task = %self.name, turns, "Turn limit reached");
                break;
            }
            turns += 1;

            let human_asked = self.agent.has_human_input()
                && self.can_respond(Responder::Entity(Entity::User), pending.as_ref(), producer);
            let Some((responder, mut doc)) = self.step(pending.as_ref(), producer).await? else {
                if human_asked {
                    debug!(task = %self.name, turn = turns, "Human passed; asking again");
                    continue;
                }
                debug!(task = %self.name, turn = turns, "No responder; stopping");
                break;
            };
            debug!(
                task = %self.name,
                turn = turns,
                responder = %self.describe(responder),
                "Step answered"
            );

            if responder == Responder::Entity(Entity::User)
                && QUIT_COMMANDS.contains(&doc.content.trim().to_lowercase().as_str())
            {
                info!(task = %self.name, "Human ended the task");
                break;
            }

            let attributed = doc
                .metadata
                .parent_responder
                .map_or(responder, Responder::Entity);

            if self.llm_delegate
                && !self.only_user_quits
                && attributed == Responder::Entity(Entity::Llm)
                && doc.content.trim_start().starts_with(DONE)
            {
                doc.content = strip_done(&doc.content);
                result = Some(doc);
                info!(task = %self.name, "LLM declared the task done");
                break;
            }

            result = Some(doc.clone());
            pending = Some(doc);
            producer = Some(attributed);

            if self.single_round && !self.only_user_quits {
                break;
            }
        }

        info!(task = %self.name, turns, responded = result.is_some(), "Task finished");
        Ok(result)
    }

    /// Offer the pending message to each eligible responder in turn.
    async fn step(
        &mut self,
        pending: Option<&ChatDocument>,
        producer: Option<Responder>,
    ) -> Result<Option<(Responder, ChatDocument)>> {
        let input = pending.cloned().map(AgentInput::Document);

        for entity in ENTITY_ORDER {
            let responder = Responder::Entity(entity);
            if !self.can_respond(responder, pending, producer) {
                continue;
            }
            let response = match entity {
                Entity::User => self.agent.user_response(input.as_ref()).await?,
                Entity::Llm => self.agent.llm_response(input.as_ref()).await?,
                Entity::Agent => self.agent.agent_response(input.as_ref()).await?,
            };
            if let Some(doc) = response.filter(ChatDocument::is_valid) {
                return Ok(Some((responder, doc)));
            }
        }

        let Some(pending) = pending else {
            return Ok(None);
        };
        for idx in 0..self.sub_tasks.len() {
            let responder = Responder::SubTask(idx);
            if !self.can_respond(responder, Some(pending), producer) {
                continue;
            }
            debug!(task = %self.name, sub_task = %self.sub_tasks[idx].name, "Delegating");
            let response = self.sub_tasks[idx].run(Some(pending.clone())).await?;
            if let Some(doc) = response.filter(ChatDocument::is_valid) {
                return Ok(Some((responder, doc)));
            }
        }

        Ok(None)
    }

    fn can_respond(
        &self,
        responder: Responder,
        pending: Option<&ChatDocument>,
        producer: Option<Responder>,
    ) -> bool {
        if producer == Some(responder) {
            return false;
        }
        let Some(pending) = pending else {
            return true;
        };

        // A function call is for code to execute, not for the LLM to chat about.
        if responder == Responder::Entity(Entity::Llm) && pending.function_call.is_some() {
            return false;
        }

        let recipient = pending.metadata.recipient.as_str();
        if recipient.is_empty() {
            return true;
        }
        match responder {
            Responder::Entity(Entity::User) => recipient == self.agent.name() || recipient == "User",
            Responder::Entity(_) => recipient == self.agent.name(),
            Responder::SubTask(idx) => self
                .sub_tasks
                .get(idx)
                .is_some_and(|t| t.name == recipient),
        }
    }

    fn describe(&self, responder: Responder) -> String {
        match responder {
            Responder::Entity(entity) => entity.to_string(),
            Responder::SubTask(idx) => self
                .sub_tasks
                .get(idx)
                .map_or_else(|| format!("sub-task {idx}"), |t| t.name.clone()),
        }
    }
}

fn strip_done(content: &str) -> String {
    let rest = content.trim_start();
    let rest = rest.strip_prefix(DONE).unwrap_or(rest);
    rest.trim_start_matches(':').trim().to_string()
}
