//! Structured messages an LLM sends to an agent.
//!
//! A message type describes one request the receiving agent can perform
//! (report data, look something up, run one of its methods). Each type
//! carries examples of itself and first-person trigger phrases, which are
//! rendered into few-shot prompts so the LLM learns when and how to emit it.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::MessageError;

/// One round of a sample conversation: the assistant's thought and question,
/// and the answer it gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThoughtQuestionAnswer {
    pub thought: String,
    pub question: String,
    pub answer: String,
}

impl ThoughtQuestionAnswer {
    pub fn new(
        thought: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            thought: thought.into(),
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// Thought and question lines, as used in few-shot format instructions.
    pub fn example(&self) -> String {
        format!("THINKING: {}\nQUESTION: {}\n", self.thought, self.question)
    }

    /// The same round as an assistant turn followed by the user's answer.
    pub fn conversation(&self) -> String {
        format!(
            "ExampleAssistant:\n{}\nExampleUser: {}\n",
            self.example(),
            self.answer
        )
    }
}

/// Pick one item uniformly at random.
///
/// `what` names the list in the error returned when it is empty.
pub fn choose<'a, T, R>(items: &'a [T], what: &str, rng: &mut R) -> Result<&'a T, MessageError>
where
    R: Rng + ?Sized,
{
    items.choose(rng).ok_or_else(|| MessageError::EmptySelection {
        what: what.to_string(),
    })
}

/// RNG for example selection: reproducible with a seed, OS-seeded without.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// A structured request an LLM can address to an agent.
///
/// Implementors declare the request name, examples of themselves and
/// trigger phrases; prompt rendering is derived from those.
pub trait AgentMessage: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The operation this message maps to on the receiving agent.
    const REQUEST: &'static str;

    fn request(&self) -> &str;

    /// Expected answer, used only when rendering sample conversations.
    fn result(&self) -> &str;

    /// Example instances for few-shot prompts. Must not be empty.
    fn examples() -> Vec<Self>;

    /// First-person phrases completing "I will use this message when...",
    /// possibly parameterised by the field values. Must not be empty.
    fn use_when(&self) -> Vec<String>;

    /// Questions that should be asked in plain text rather than with this
    /// message.
    fn non_usage_examples() -> Vec<ThoughtQuestionAnswer> {
        vec![
            ThoughtQuestionAnswer::new(
                "I need to know the population of the US",
                "What is the population of the US?",
                "328,239,523",
            ),
            ThoughtQuestionAnswer::new(
                "I want to check how many files are in the repo",
                "How many files are in the repo?",
                "1,000",
            ),
        ]
    }

    /// Check the request field names this type's operation.
    fn validate(&self) -> Result<(), MessageError> {
        if self.request() != Self::REQUEST {
            return Err(MessageError::InvalidRequest {
                expected: Self::REQUEST.to_string(),
                found: self.request().to_string(),
            });
        }
        Ok(())
    }

    /// JSON the LLM must produce: every field except `result`.
    fn json_example(&self) -> Result<String, MessageError> {
        let mut value = serde_json::to_value(self).map_err(|e| MessageError::Malformed {
            request: Self::REQUEST.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(map) = value.as_object_mut() {
            map.remove("result");
        }
        serde_json::to_string_pretty(&value).map_err(|e| MessageError::Malformed {
            request: Self::REQUEST.to_string(),
            reason: e.to_string(),
        })
    }

    /// JSON schema of the fields the LLM supplies, inferred from the first example.
    fn parameters_schema() -> Result<serde_json::Value, MessageError> {
        let examples = Self::examples();
        let first = examples.first().ok_or_else(|| MessageError::EmptySelection {
            what: "examples".into(),
        })?;
        let value = serde_json::to_value(first).map_err(|e| MessageError::Malformed {
            request: Self::REQUEST.to_string(),
            reason: e.to_string(),
        })?;

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        if let Some(map) = value.as_object() {
            for (key, field) in map.iter().filter(|(k, _)| k.as_str() != "result") {
                let kind = match field {
                    serde_json::Value::Bool(_) => "boolean",
                    serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
                    serde_json::Value::Number(_) => "number",
                    serde_json::Value::Array(_) => "array",
                    serde_json::Value::Object(_) => "object",
                    _ => "string",
                };
                properties.insert(key.clone(), serde_json::json!({ "type": kind }));
                required.push(key.clone());
            }
        }

        Ok(serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }

    /// A random example of using this message, standalone or as a
    /// two-turn conversation snippet.
    fn usage_example<R: Rng + ?Sized>(rng: &mut R, conversation: bool) -> Result<String, MessageError> {
        let examples = Self::examples();
        let ex = choose(&examples, "examples", rng)?;
        let phrases = ex.use_when();
        let phrase = choose(&phrases, "use_when phrases", rng)?;
        let tqa = ThoughtQuestionAnswer::new(phrase.clone(), ex.json_example()?, ex.result());
        Ok(if conversation {
            tqa.conversation()
        } else {
            tqa.example()
        })
    }

    fn non_usage_example<R: Rng + ?Sized>(rng: &mut R, conversation: bool) -> Result<String, MessageError> {
        let examples = Self::non_usage_examples();
        let tqa = choose(&examples, "non-usage examples", rng)?;
        Ok(if conversation {
            tqa.conversation()
        } else {
            tqa.example()
        })
    }

    /// A usage conversation, optionally followed by one where the question
    /// is asked in plain text.
    fn sample_conversation<R: Rng + ?Sized>(rng: &mut R, json_only: bool) -> Result<String, MessageError> {
        let json_qa = Self::usage_example(rng, true)?;
        if json_only {
            return Ok(json_qa);
        }
        Ok(format!("{}\n\n{}", json_qa, Self::non_usage_example(rng, true)?))
    }

    /// The block an agent adds to its system prompt when it accepts this message.
    fn instructions<R: Rng + ?Sized>(rng: &mut R) -> Result<String, MessageError> {
        let examples = Self::examples();
        let first = examples.first().ok_or_else(|| MessageError::EmptySelection {
            what: "examples".into(),
        })?;
        let phrases = first.use_when();
        if phrases.is_empty() {
            return Err(MessageError::EmptySelection {
                what: "use_when phrases".into(),
            });
        }

        let mut out = format!("## `{}`\n\nUse this request when:\n", Self::REQUEST);
        for phrase in &phrases {
            out.push_str(&format!("- {phrase}\n"));
        }
        out.push_str("\nFormat (respond with this JSON and nothing else):\n");
        out.push_str(&first.json_example()?);
        out.push_str("\n\nSample conversation:\n");
        out.push_str(&Self::sample_conversation(rng, false)?);
        Ok(out)
    }
}
