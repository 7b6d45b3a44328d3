//! Similarity search over previously answered questions.
//!
//! The index lives in memory for one video session and is rebuilt from the
//! answer cache on load. Without an embedder every query comes back empty,
//! which the orchestrator treats as "no related context".

use crate::cache::{normalize_question, CacheEntry};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::extract::Timestamp;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// A prior question/answer pair as held by the index.
#[derive(Debug, Clone)]
struct IndexedQuestion {
    question: String,
    answer: String,
    timestamps: Vec<Timestamp>,
    embedding: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
}

/// A related prior question returned by [`SemanticIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub question: String,
    pub answer: String,
    pub timestamps: Vec<Timestamp>,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// In-memory similarity index over a video's answered questions.
pub struct SemanticIndex {
    embedder: Option<Arc<dyn Embedder>>,
    entries: RwLock<Vec<IndexedQuestion>>,
}

impl SemanticIndex {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Build an index from cached answers.
    pub fn from_entries(embedder: Option<Arc<dyn Embedder>>, entries: Vec<CacheEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| IndexedQuestion {
                question: e.question,
                answer: e.answer,
                timestamps: e.timestamps,
                embedding: e.embedding,
                created_at: e.created_at,
            })
            .collect();

        Self {
            embedder,
            entries: RwLock::new(entries),
        }
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Add an answered question, replacing an earlier answer to the same question.
    pub async fn index(
        &self,
        question: &str,
        answer: &str,
        timestamps: Vec<Timestamp>,
        embedding: Option<Vec<f32>>,
        created_at: DateTime<Utc>,
    ) {
        let question = normalize_question(question);
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.question != question);
        entries.push(IndexedQuestion {
            question,
            answer: answer.to_string(),
            timestamps,
            embedding,
            created_at,
        });
    }

    /// Embed a question, or `None` when embeddings are unavailable.
    pub async fn embed_question(&self, question: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&normalize_question(question)).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Could not embed question, continuing without related context: {}", e);
                None
            }
        }
    }

    /// Return up to `k` prior questions most similar to `question`.
    ///
    /// Ranked by cosine similarity, most recent first on ties. Empty when
    /// nothing is indexed or the question cannot be embedded.
    #[instrument(skip(self))]
    pub async fn query(&self, question: &str, k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty().await {
            return Vec::new();
        }

        match self.embed_question(question).await {
            Some(embedding) => self.nearest(&embedding, k).await,
            None => Vec::new(),
        }
    }

    /// Like [`query`](Self::query) for an already embedded question.
    pub async fn nearest(&self, query_embedding: &[f32], k: usize) -> Vec<Neighbor> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(&IndexedQuestion, f32)> = entries
            .iter()
            .filter_map(|e| {
                let embedding = e.embedding.as_ref()?;
                Some((e, cosine_similarity(query_embedding, embedding)))
            })
            .collect();

        scored.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        scored.truncate(k);

        debug!("Found {} related questions", scored.len());

        scored
            .into_iter()
            .map(|(e, score)| Neighbor {
                question: e.question.clone(),
                answer: e.answer.clone(),
                timestamps: e.timestamps.clone(),
                score,
            })
            .collect()
    }

    /// Questions that were stored without an embedding.
    pub async fn missing_embeddings(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.embedding.is_none())
            .map(|e| e.question.clone())
            .collect()
    }

    /// Embed every entry that lacks an embedding.
    ///
    /// Returns the new `(question, embedding)` pairs so the caller can
    /// persist them. Does nothing without an embedder.
    #[instrument(skip(self))]
    pub async fn backfill(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(Vec::new());
        };

        let missing = self.missing_embeddings().await;
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = embedder.embed_batch(&missing).await?;
        let filled: Vec<(String, Vec<f32>)> = missing.into_iter().zip(embeddings).collect();

        let mut entries = self.entries.write().await;
        for (question, embedding) in &filled {
            if let Some(entry) = entries.iter_mut().find(|e| &e.question == question) {
                entry.embedding = Some(embedding.clone());
            }
        }

        info!("Backfilled embeddings for {} cached questions", filled.len());
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AskvidError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Embeds by keyword presence: [rust, python, video].
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn vector(text: &str) -> Vec<f32> {
            ["rust", "python", "video"]
                .iter()
                .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                .collect()
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AskvidError::Embedding("service down".into()))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AskvidError::Embedding("service down".into()))
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let index = SemanticIndex::new(Some(embedder.clone()));

        assert!(index.query("anything about rust", 3).await.is_empty());
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ranked_by_similarity() {
        let index = SemanticIndex::new(Some(Arc::new(KeywordEmbedder::new())));
        let now = Utc::now();
        index.index("python basics", "a1", Vec::new(), Some(vec![0.0, 1.0, 0.0]), now).await;
        index.index("rust and video", "a2", Vec::new(), Some(vec![1.0, 0.0, 1.0]), now).await;
        index.index("rust only", "a3", Vec::new(), Some(vec![1.0, 0.0, 0.0]), now).await;
        index.index("no embedding", "a4", Vec::new(), None, now).await;

        let neighbors = index.query("tell me about rust", 5).await;
        let questions: Vec<_> = neighbors.iter().map(|n| n.question.as_str()).collect();
        assert_eq!(questions, vec!["rust only", "rust and video", "python basics"]);
        assert!(neighbors.windows(2).all(|w| w[0].score >= w[1].score));

        assert_eq!(index.query("tell me about rust", 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_ties_prefer_recent() {
        let index = SemanticIndex::new(Some(Arc::new(KeywordEmbedder::new())));
        let now = Utc::now();
        index.index("older", "a", Vec::new(), Some(vec![1.0, 0.0, 0.0]), now - Duration::minutes(5)).await;
        index.index("newer", "b", Vec::new(), Some(vec![1.0, 0.0, 0.0]), now).await;

        let neighbors = index.query("rust", 2).await;
        assert_eq!(neighbors[0].question, "newer");
        assert_eq!(neighbors[1].question, "older");
    }

    #[tokio::test]
    async fn test_embedder_failure_is_not_fatal() {
        let index = SemanticIndex::new(Some(Arc::new(FailingEmbedder)));
        index.index("q", "a", Vec::new(), Some(vec![1.0, 0.0, 0.0]), Utc::now()).await;
        assert!(index.query("q", 3).await.is_empty());

        let without = SemanticIndex::new(None);
        without.index("q", "a", Vec::new(), Some(vec![1.0, 0.0, 0.0]), Utc::now()).await;
        assert!(without.query("q", 3).await.is_empty());
        assert!(without.backfill().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_replaces_same_question() {
        let index = SemanticIndex::new(None);
        index.index("What?", "old", Vec::new(), None, Utc::now()).await;
        index.index("  what? ", "new", Vec::new(), None, Utc::now()).await;
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_backfill_fills_missing() {
        let entries = vec![
            CacheEntry::new("vid", "rust question", "a", Vec::new()),
            CacheEntry::new("vid", "python question", "b", Vec::new())
                .with_embedding(Some(vec![0.0, 1.0, 0.0])),
        ];
        let index = SemanticIndex::from_entries(Some(Arc::new(KeywordEmbedder::new())), entries);

        assert_eq!(index.missing_embeddings().await, vec!["rust question".to_string()]);

        let filled = index.backfill().await.unwrap();
        assert_eq!(filled, vec![("rust question".to_string(), vec![1.0, 0.0, 0.0])]);
        assert!(index.missing_embeddings().await.is_empty());
        assert_eq!(index.query("rust", 1).await[0].question, "rust question");
    }
}
