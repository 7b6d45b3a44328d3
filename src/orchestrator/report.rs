//! Per-question outcomes and the batch result artifact.

use crate::error::{AskvidError, ErrorKind, Result};
use crate::extract::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Whether an answer came from the cache or a new model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    CacheHit,
    Fresh,
}

/// An answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer_text: String,
    pub timestamps: Vec<Timestamp>,
    pub source: AnswerSource,
}

/// Result of asking one question. A failure never aborts the rest of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Answered(AnswerResult),
    Failed {
        question: String,
        kind: ErrorKind,
        message: String,
    },
}

impl AnswerOutcome {
    pub fn failed(question: &str, err: &AskvidError) -> Self {
        AnswerOutcome::Failed {
            question: question.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn question(&self) -> &str {
        match self {
            AnswerOutcome::Answered(result) => &result.question,
            AnswerOutcome::Failed { question, .. } => question,
        }
    }

    pub fn answer(&self) -> Option<&AnswerResult> {
        match self {
            AnswerOutcome::Answered(result) => Some(result),
            AnswerOutcome::Failed { .. } => None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer().is_some()
    }
}

/// How a batch was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Each question sees the answers before it.
    Sequential,
    /// All questions dispatched at once.
    Independent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Answered,
    Failed,
}

/// One question's line in the batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub question: String,
    pub status: ReportStatus,
    pub answer: Option<String>,
    pub timestamps: Vec<Timestamp>,
    pub source: Option<AnswerSource>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl From<&AnswerOutcome> for ReportEntry {
    fn from(outcome: &AnswerOutcome) -> Self {
        match outcome {
            AnswerOutcome::Answered(result) => ReportEntry {
                question: result.question.clone(),
                status: ReportStatus::Answered,
                answer: Some(result.answer_text.clone()),
                timestamps: result.timestamps.clone(),
                source: Some(result.source),
                error_kind: None,
                error: None,
            },
            AnswerOutcome::Failed {
                question,
                kind,
                message,
            } => ReportEntry {
                question: question.clone(),
                status: ReportStatus::Failed,
                answer: None,
                timestamps: Vec::new(),
                source: None,
                error_kind: Some(*kind),
                error: Some(message.clone()),
            },
        }
    }
}

/// JSON artifact written after a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub video_id: String,
    pub title: Option<String>,
    pub mode: BatchMode,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ReportEntry>,
}

impl BatchReport {
    pub fn new(
        video_id: &str,
        title: Option<String>,
        mode: BatchMode,
        outcomes: &[AnswerOutcome],
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            title,
            mode,
            generated_at: Utc::now(),
            results: outcomes.iter().map(ReportEntry::from).collect(),
        }
    }

    pub fn answered_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ReportStatus::Answered)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.answered_count()
    }

    /// Write the report as pretty JSON.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so readers see either the old file or the complete new one.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.flush()?;
        file.persist(path).map_err(|e| AskvidError::Io(e.error))?;

        info!("Wrote batch report to {:?}", path);
        Ok(())
    }
}
