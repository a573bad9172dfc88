//! `llmagent`: chat with a GitHub repository.

use crate::input::StdinInput;
use llmagent_agent::{ChatAgent, ChatAgentConfig, LlmSettings, Task};
use llmagent_config::AppConfig;
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_URL: &str = "https://github.com/eugeneyan/testing-ml";
pub const DEFAULT_PERSONA: &str = "a coding expert, who will help me understand a code repo";

static YOU_ARE: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r"(?i)^\s*you\s+are\s*").ok());

pub struct ChatOptions {
    pub debug: bool,
    pub gpt4: bool,
    pub nocache: bool,
}

/// `"You are " + persona`, with any "you are" the user already typed removed.
pub fn persona_system_message(persona: &str) -> String {
    let persona = match YOU_ARE.as_ref() {
        Some(re) => re.replace(persona, "").into_owned(),
        None => persona.to_string(),
    };
    format!("You are {}", persona.trim())
}

fn system_message(persona: &str, repo_url: &str) -> String {
    format!(
        "{}\n\nThe questions you will be asked are about the code repository at {repo_url}.",
        persona_system_message(persona)
    )
}

/// The interactive session: runs until the human types `q` or `x`.
fn session_task(agent: ChatAgent, system_message: &str) -> Task {
    Task::new(agent)
        .llm_delegate(false)
        .single_round(false)
        .only_user_quits(true)
        .max_turns(usize::MAX)
        .with_system_message(system_message)
}

pub async fn run(opts: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.debug |= opts.debug;
    if opts.nocache {
        config.llm.cache = false;
    }
    debug!(?config, "Loaded configuration");

    // Check for API key early to give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LLMAGENT_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    println!();
    println!("  Welcome to the GitHub Repo chatbot!");
    println!("  Enter x or q to quit.");

    let mut input = StdinInput::new();
    let repo_url = input
        .ask("Enter a GitHub URL (or leave empty for the default repo)", DEFAULT_URL)
        .await?;
    let persona = input
        .ask("Tell me who I am; complete this sentence: You are...", DEFAULT_PERSONA)
        .await?;

    let provider = llmagent_providers::build_from_config(&config);
    let llm = LlmSettings::from_config(&config, opts.gpt4);

    println!();
    println!("  Repo:      {repo_url}");
    println!("  Model:     {}", llm.model);
    println!("  Cache:     {}", if config.llm.cache { "on" } else { "off" });

    let agent = ChatAgent::new(ChatAgentConfig::new("CodeChat").with_llm(llm))
        .with_provider(provider)
        .with_human_input(Box::new(input));

    let mut task = session_task(agent, &system_message(&persona, &repo_url));
    task.run(None).await?;

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
