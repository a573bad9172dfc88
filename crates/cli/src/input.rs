//! Terminal input for the human responder.

use async_trait::async_trait;
use llmagent_agent::HumanInput;
use llmagent_core::{Error, Result};
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};

/// Reads human replies line by line from stdin.
pub struct StdinInput {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(io::stdin()).lines(),
        }
    }

    /// Ask a question, falling back to `default` on an empty answer.
    pub async fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        let answer = self.read_line(&format!("{question} ({default})")).await?;
        let answer = answer.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HumanInput for StdinInput {
    async fn read_line(&mut self, prompt: &str) -> Result<String> {
        println!();
        for line in prompt.lines() {
            println!("  {line}");
        }
        print!("  > ");
        std::io::stdout()
            .flush()
            .map_err(|e| Error::Input(e.to_string()))?;

        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            // EOF (Ctrl+D) ends the session
            Ok(None) => Ok("q".into()),
            Err(e) => Err(Error::Input(e.to_string())),
        }
    }
}
