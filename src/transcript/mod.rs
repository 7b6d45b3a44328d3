//! Transcript segments, chunking and budgeted context retrieval.

mod source;
mod video;
pub mod vtt;

pub use source::{TranscriptSource, YtDlpTranscriptSource};
pub use video::{derive_video_id, youtube_video_id, VideoRef};

use crate::error::{AskvidError, Result};
use crate::extract::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Characters per token used for size estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// A single caption cue with timestamp information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Caption text.
    pub text: String,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text,
        }
    }
}

/// A contiguous run of segments used as the unit of context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    pub sequence_index: usize,
}

impl TranscriptChunk {
    /// Create a chunk, enforcing `start < end` and non-empty text.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String, sequence_index: usize) -> Result<Self> {
        if !(start_seconds < end_seconds) {
            return Err(AskvidError::InvalidInput(format!(
                "Chunk {} has start {:.3}s not before end {:.3}s",
                sequence_index, start_seconds, end_seconds
            )));
        }
        if text.trim().is_empty() {
            return Err(AskvidError::InvalidInput(format!(
                "Chunk {} has no text",
                sequence_index
            )));
        }
        Ok(Self {
            start_seconds,
            end_seconds,
            text,
            sequence_index,
        })
    }

    /// Whether the chunk's time range contains the given position.
    pub fn covers(&self, ts: &Timestamp) -> bool {
        let at = ts.as_seconds();
        // Chunk bounds carry fractions; compare at whole-second granularity.
        self.start_seconds.floor() <= at && at <= self.end_seconds
    }

    /// Render as a prompt line: `[HH:MM:SS - HH:MM:SS] text`.
    pub fn render(&self) -> String {
        format!(
            "[{} - {}] {}",
            Timestamp::from_seconds(self.start_seconds),
            Timestamp::from_seconds(self.end_seconds),
            self.text
        )
    }

    fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// Render chunks in the order given, one paragraph per chunk.
pub fn render_chunks<'a>(chunks: impl IntoIterator<Item = &'a TranscriptChunk>) -> String {
    chunks
        .into_iter()
        .map(TranscriptChunk::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Immutable set of chunks for one video.
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    chunks: Vec<TranscriptChunk>,
}

impl TranscriptStore {
    /// Wrap already-chunked content (e.g. loaded from the cache).
    pub fn from_chunks(mut chunks: Vec<TranscriptChunk>) -> Self {
        chunks.sort_by_key(|c| c.sequence_index);
        Self { chunks }
    }

    /// Group segments into chunks of at most `max_chunk_chars` characters.
    ///
    /// A segment larger than the budget becomes a chunk of its own.
    pub fn from_segments(segments: &[TranscriptSegment], max_chunk_chars: usize) -> Self {
        let mut chunks = Vec::new();
        let mut current: Vec<&TranscriptSegment> = Vec::new();
        let mut current_size = 0usize;

        for segment in segments.iter().filter(|s| !s.text.trim().is_empty()) {
            let size = segment.text.chars().count();
            if current_size + size > max_chunk_chars && !current.is_empty() {
                Self::push_chunk(&mut chunks, &current);
                current.clear();
                current_size = 0;
            }
            current.push(segment);
            current_size += size;
        }

        if !current.is_empty() {
            Self::push_chunk(&mut chunks, &current);
        }

        debug!("Chunked {} segments into {} chunks", segments.len(), chunks.len());
        Self { chunks }
    }

    fn push_chunk(chunks: &mut Vec<TranscriptChunk>, group: &[&TranscriptSegment]) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            return;
        };
        let text = group
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");

        match TranscriptChunk::new(first.start_seconds, last.end_seconds, text, chunks.len()) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => warn!("Skipping chunk: {}", e),
        }
    }

    pub fn chunks(&self) -> &[TranscriptChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Full transcript as sent to a remote cache or inlined into a prompt.
    pub fn render(&self) -> String {
        render_chunks(&self.chunks)
    }

    /// Estimated token count of the full rendered transcript.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.render())
    }

    /// Select chunks within a token budget.
    ///
    /// Chunks covering any `focus` timestamp are taken first, then the rest in
    /// sequence order until the budget is spent. The first selected chunk is
    /// always included. The result is in sequence order.
    pub fn context_within(&self, budget_tokens: usize, focus: &[Timestamp]) -> Vec<&TranscriptChunk> {
        let focused = self
            .chunks
            .iter()
            .filter(|c| focus.iter().any(|ts| c.covers(ts)));
        let rest = self
            .chunks
            .iter()
            .filter(|c| !focus.iter().any(|ts| c.covers(ts)));

        let mut selected: Vec<&TranscriptChunk> = Vec::new();
        let mut used = 0usize;
        for chunk in focused.chain(rest) {
            let cost = chunk.estimated_tokens();
            if !selected.is_empty() && used + cost > budget_tokens {
                continue;
            }
            used += cost;
            selected.push(chunk);
        }

        selected.sort_by_key(|c| c.sequence_index);
        selected
    }
}
