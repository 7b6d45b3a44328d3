//! Interactive ask command.

use super::load::load_session;
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{AnswerOutcome, AnswerResult};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the ask command: questions are read from stdin until a blank line.
///
/// Each answer becomes context for the following questions.
pub async fn run_ask(url: &str, settings: Settings) -> Result<()> {
    let orchestrator = super::ask_orchestrator(settings)?;
    let session = load_session(&orchestrator, url).await?;

    println!(
        "\n{} {}",
        style("askvid").bold().cyan(),
        style(session.title.as_deref().unwrap_or(session.video_id())).bold()
    );
    println!("{}\n", style("Type a question, or an empty line to quit.").dim());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut prior: Vec<AnswerResult> = Vec::new();

    loop {
        print!("{} ", style("Question:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let question = input.trim();
        if question.is_empty() {
            break;
        }

        let spinner = Output::spinner("Thinking...");
        let outcome = orchestrator.ask(&session, question, &prior).await;
        spinner.finish_and_clear();

        Output::outcome(&outcome);
        println!();
        if let AnswerOutcome::Answered(result) = outcome {
            prior.push(result);
        }
    }

    Output::info(&format!("{} questions answered this session.", prior.len()));
    Ok(())
}
