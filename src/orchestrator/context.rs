//! Prompt context assembly for a single question.

use super::report::AnswerResult;
use crate::config::{NeighborPolicy, Prompts};
use crate::generation::GenerateRequest;
use crate::semantic::Neighbor;
use std::collections::HashMap;

/// Where the model finds the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptContext {
    /// Transcript already uploaded to the provider's cache.
    Remote { cache_id: String },
    /// Rendered transcript chunks sent with the prompt.
    Inline(String),
}

/// Everything that goes into one model request.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub question: String,
    pub transcript: TranscriptContext,
    pub neighbors: Vec<Neighbor>,
    pub prior_answers: Vec<AnswerResult>,
}

impl ContextBundle {
    fn render_neighbors(&self, policy: NeighborPolicy) -> String {
        if self.neighbors.is_empty() {
            return String::new();
        }

        match policy {
            NeighborPolicy::Off => String::new(),
            NeighborPolicy::QuestionsOnly => {
                let mut text = String::from("Related questions asked earlier about this video:\n");
                for neighbor in &self.neighbors {
                    text.push_str(&format!("- {}\n", neighbor.question));
                }
                text.push('\n');
                text
            }
            NeighborPolicy::Verbatim => {
                let mut text =
                    String::from("Here are previous questions and answers related to the video:\n\n");
                for neighbor in &self.neighbors {
                    text.push_str(&format!("Q: {}\nA: {}\n\n", neighbor.question, neighbor.answer));
                }
                text
            }
        }
    }

    fn render_prior_answers(&self) -> String {
        if self.prior_answers.is_empty() {
            return String::new();
        }

        let mut text = String::from("Earlier in this session you answered:\n\n");
        for prior in &self.prior_answers {
            text.push_str(&format!("Q: {}\nA: {}\n\n", prior.question, prior.answer_text));
        }
        text
    }

    /// Render the bundle into a model request.
    pub fn to_request(&self, prompts: &Prompts, policy: NeighborPolicy) -> GenerateRequest {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), self.question.clone());
        vars.insert("neighbors".to_string(), self.render_neighbors(policy));
        vars.insert("prior_answers".to_string(), self.render_prior_answers());

        let (template, remote_cache_id) = match &self.transcript {
            TranscriptContext::Remote { cache_id } => {
                (&prompts.answer.user_cached, Some(cache_id.clone()))
            }
            TranscriptContext::Inline(text) => {
                vars.insert("transcript".to_string(), text.clone());
                (&prompts.answer.user, None)
            }
        };

        GenerateRequest {
            system: prompts.render_with_custom(&prompts.answer.system, &HashMap::new()),
            prompt: prompts.render_with_custom(template, &vars),
            remote_cache_id,
        }
    }
}
