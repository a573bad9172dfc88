//! llmagent CLI: chat with a code repository.
//!
//! Asks for a repository URL and a persona for the assistant, then runs an
//! interactive task: the human and the LLM take turns until `q` or `x`.

use clap::Parser;

mod commands;
mod input;

#[derive(Parser)]
#[command(
    name = "llmagent",
    about = "llmagent: chat with a code repository",
    version,
    author
)]
struct Cli {
    /// Debug mode (verbose logging)
    #[arg(short, long)]
    debug: bool,

    /// Use GPT-4 instead of the default chat model
    #[arg(short = '4', long)]
    gpt4: bool,

    /// Do not use the response cache
    #[arg(long, visible_alias = "nc")]
    nocache: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    commands::chat::run(commands::chat::ChatOptions {
        debug: cli.debug,
        gpt4: cli.gpt4,
        nocache: cli.nocache,
    })
    .await?;

    Ok(())
}
