//! Batch command implementation.

use super::load::load_session;
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::BatchMode;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Read a question file.
///
/// A JSON array of strings is used as is. Any other content is read as one
/// question per line, skipping blank lines and `#` comments.
pub fn load_questions(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read question file {}", path.display()))?;

    let questions: Vec<String> = match serde_json::from_str::<Vec<String>>(&content) {
        Ok(list) => list
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect(),
        Err(_) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
    };

    if questions.is_empty() {
        bail!("No questions found in {}", path.display());
    }
    Ok(questions)
}

/// Run the batch command.
pub async fn run_batch(
    url: &str,
    questions_file: Option<String>,
    output: Option<String>,
    independent: bool,
    settings: Settings,
) -> Result<()> {
    let questions = match &questions_file {
        Some(path) => load_questions(&Settings::expand_path(path))?,
        None => settings.batch.questions.clone(),
    };
    let output: PathBuf = Settings::expand_path(output.as_deref().unwrap_or(&settings.batch.output));
    let mode = if independent {
        BatchMode::Independent
    } else {
        BatchMode::Sequential
    };

    let orchestrator = super::ask_orchestrator(settings)?;
    let session = load_session(&orchestrator, url).await?;

    let spinner = Output::spinner(&format!("Answering {} questions...", questions.len()));
    let report = orchestrator.run_batch(&session, &questions, mode).await;
    spinner.finish_and_clear();

    for entry in &report.results {
        match &entry.answer {
            Some(answer) => Output::cached_answer(&entry.question, answer, &entry.timestamps),
            None => Output::error(&format!(
                "{}: {}",
                entry.question,
                entry.error.as_deref().unwrap_or("failed")
            )),
        }
    }

    report
        .write_atomic(&output)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;

    println!();
    Output::success(&format!(
        "{} answered, {} failed. Report written to {}",
        report.answered_count(),
        report.failed_count(),
        output.display()
    ));
    Ok(())
}
