//! CLI output formatting utilities.

use crate::cache::CachedVideo;
use crate::extract::Timestamp;
use crate::orchestrator::{AnswerOutcome, AnswerSource};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print a cached video summary line.
    pub fn video_info(video: &CachedVideo) {
        let updated = video
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} {} ({}, {} chunks, {} answers, updated {})",
            style("*").cyan(),
            style(video.title.as_deref().unwrap_or(&video.video_id)).bold(),
            style(&video.video_id).dim(),
            video.chunk_count,
            video.entry_count,
            updated
        );
    }

    /// Print one answered or failed question.
    pub fn outcome(outcome: &AnswerOutcome) {
        match outcome {
            AnswerOutcome::Answered(result) => {
                let tag = match result.source {
                    AnswerSource::CacheHit => style("cached").dim(),
                    AnswerSource::Fresh => style("fresh").green(),
                };
                println!("\n{} {} [{}]", style("Q:").cyan().bold(), result.question, tag);
                println!("{}", result.answer_text.trim());
                if !result.timestamps.is_empty() {
                    println!("   {}", style(timestamps_line(&result.timestamps)).cyan());
                }
            }
            AnswerOutcome::Failed {
                question,
                kind,
                message,
            } => {
                println!("\n{} {}", style("Q:").cyan().bold(), question);
                Output::error(&format!("{} ({})", message, kind));
            }
        }
    }

    /// Print a cached question with a shortened answer.
    pub fn cached_answer(question: &str, answer: &str, timestamps: &[Timestamp]) {
        println!("\n{} {}", style(">>").green(), style(question).bold());
        println!("   {}", content_preview(answer, 200));
        if !timestamps.is_empty() {
            println!("   {}", style(timestamps_line(timestamps)).dim());
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

fn timestamps_line(timestamps: &[Timestamp]) -> String {
    timestamps
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}
