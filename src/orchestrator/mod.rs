//! Question orchestration for one video.
//!
//! A question is answered from the cache when possible. Otherwise a prompt
//! is assembled from the transcript (inline or remote), related earlier
//! questions and this session's answers, then dispatched under the rate
//! budget. Fresh answers are written back to the cache and the index.

pub mod context;
pub mod report;

pub use context::{ContextBundle, TranscriptContext};
pub use report::{
    AnswerOutcome, AnswerResult, AnswerSource, BatchMode, BatchReport, ReportEntry, ReportStatus,
};

use crate::cache::{normalize_question, CacheEntry, CacheManager, RemoteCacheHandle};
use crate::config::{NeighborPolicy, Prompts, Settings};
use crate::dispatch::Dispatcher;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{AskvidError, Result};
use crate::extract::{extract, Timestamp};
use crate::generation::{create_generator, Generator};
use crate::semantic::SemanticIndex;
use crate::transcript::{
    render_chunks, TranscriptSource, TranscriptStore, VideoRef, YtDlpTranscriptSource,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// A loaded video, shared by every question asked about it.
pub struct VideoSession {
    pub video: VideoRef,
    pub title: Option<String>,
    transcript: TranscriptStore,
    index: SemanticIndex,
    remote_handle: RwLock<Option<RemoteCacheHandle>>,
}

impl VideoSession {
    pub fn video_id(&self) -> &str {
        &self.video.id
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// The remote cache handle currently in use, if any.
    pub async fn remote_handle(&self) -> Option<RemoteCacheHandle> {
        self.remote_handle.read().await.clone()
    }

    fn inline_context(&self, budget_tokens: usize, focus: &[Timestamp]) -> TranscriptContext {
        TranscriptContext::Inline(render_chunks(
            self.transcript.context_within(budget_tokens, focus),
        ))
    }

    /// Forget `remote_cache_id` if it is still the session's handle.
    async fn drop_remote_handle(&self, remote_cache_id: &str) {
        let mut slot = self.remote_handle.write().await;
        if slot
            .as_ref()
            .is_some_and(|h| h.remote_cache_id == remote_cache_id)
        {
            *slot = None;
        }
    }
}

/// Coordinates cache, index, dispatcher and extractor.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    cache: Arc<CacheManager>,
    generator: Arc<dyn Generator>,
    dispatcher: Dispatcher,
    embedder: Option<Arc<dyn Embedder>>,
    source: Arc<dyn TranscriptSource>,
}

impl Orchestrator {
    /// Build the production pipeline from settings. Must run inside a Tokio runtime.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let videos_dir = settings.videos_dir();
        std::fs::create_dir_all(&videos_dir)?;
        let cache = Arc::new(
            CacheManager::new(videos_dir).with_min_tokens(settings.remote_cache.min_tokens),
        );

        let generator = create_generator(&settings.generation)?;
        info!("Using {} ({})", generator.name(), settings.generation.model);

        let embedder: Option<Arc<dyn Embedder>> = if settings.embedding.enabled {
            Some(Arc::new(OpenAIEmbedder::new(
                &settings.embedding,
                Duration::from_secs(settings.generation.request_timeout_secs),
            )?))
        } else {
            info!("Embeddings disabled, related questions will not be used");
            None
        };

        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;
        let source = Arc::new(YtDlpTranscriptSource::new(
            temp_dir,
            &settings.transcript.language,
        ));

        Ok(Self::with_components(
            settings, prompts, cache, generator, embedder, source,
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        cache: Arc<CacheManager>,
        generator: Arc<dyn Generator>,
        embedder: Option<Arc<dyn Embedder>>,
        source: Arc<dyn TranscriptSource>,
    ) -> Self {
        let dispatcher = Dispatcher::from_settings(Arc::clone(&generator), &settings.dispatch);
        Self {
            settings,
            prompts,
            cache,
            generator,
            dispatcher,
            embedder,
            source,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Load a video: transcript, related-question index and remote cache.
    #[instrument(skip(self))]
    pub async fn load_video(&self, input: &str) -> Result<Arc<VideoSession>> {
        let video = VideoRef::parse(input);
        let video_id = video.id.clone();

        let cached_chunks = self.cache.chunks(&video_id)?;
        let transcript = if cached_chunks.is_empty() {
            let segments = self.source.fetch(&video).await?;
            let transcript =
                TranscriptStore::from_segments(&segments, self.settings.transcript.max_chunk_chars);
            if transcript.is_empty() {
                return Err(AskvidError::TranscriptUnavailable(video_id));
            }
            self.cache.store_chunks(&video_id, None, transcript.chunks())?;
            transcript
        } else {
            info!("Using {} cached transcript chunks", cached_chunks.len());
            TranscriptStore::from_chunks(cached_chunks)
        };

        let index = SemanticIndex::from_entries(self.embedder.clone(), self.cache.entries(&video_id)?);
        match index.backfill().await {
            Ok(filled) => {
                for (question, embedding) in filled {
                    if let Err(e) = self.cache.set_embedding(&video_id, &question, &embedding) {
                        warn!("Could not store embedding for {:?}: {}", question, e);
                    }
                }
            }
            Err(e) => warn!("Could not backfill embeddings: {}", e),
        }

        let remote_handle = self.resolve_remote_handle(&video_id, &transcript).await;

        Ok(Arc::new(VideoSession {
            title: self.cache.title(&video_id).unwrap_or_default(),
            video,
            transcript,
            index,
            remote_handle: RwLock::new(remote_handle),
        }))
    }

    async fn resolve_remote_handle(
        &self,
        video_id: &str,
        transcript: &TranscriptStore,
    ) -> Option<RemoteCacheHandle> {
        if !self.settings.remote_cache.enabled {
            return None;
        }

        match self.cache.get_remote_handle(video_id) {
            Ok(Some(handle)) => return Some(handle),
            Ok(None) => {}
            Err(e) => warn!("Could not read remote cache handle: {}", e),
        }

        let ttl = Duration::from_secs(self.settings.remote_cache.ttl_secs);
        self.cache
            .create_remote_handle_if_warranted(video_id, transcript.estimated_tokens(), || {
                async move {
                    let content = transcript.render();
                    self.generator.create_cache(video_id, &content, ttl).await
                }
            })
            .await
    }

    /// The session's remote handle, recreated when it has expired.
    async fn live_remote_handle(&self, session: &VideoSession) -> Option<RemoteCacheHandle> {
        if let Some(handle) = session.remote_handle.read().await.as_ref() {
            if !handle.is_expired() {
                return Some(handle.clone());
            }
        }

        let mut slot = session.remote_handle.write().await;
        // Another question may have refreshed it while we waited.
        if let Some(handle) = slot.as_ref() {
            if !handle.is_expired() {
                return Some(handle.clone());
            }
            info!("Remote cache {} expired", handle.remote_cache_id);
        }
        let handle = self
            .resolve_remote_handle(&session.video.id, &session.transcript)
            .await;
        *slot = handle.clone();
        handle
    }

    /// Answer one question, given this session's earlier answers.
    ///
    /// Dropping the returned future abandons the model request; the cache
    /// is only written after an answer has arrived.
    pub async fn ask(
        &self,
        session: &VideoSession,
        question: &str,
        prior: &[AnswerResult],
    ) -> AnswerOutcome {
        let timeout_secs = self.settings.batch.question_timeout_secs;
        let result = if timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.answer(session, question, prior),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AskvidError::Cancelled(format!(
                    "no answer within {}s",
                    timeout_secs
                ))),
            }
        } else {
            self.answer(session, question, prior).await
        };

        match result {
            Ok(answer) => AnswerOutcome::Answered(answer),
            Err(e) => {
                warn!("Question {:?} failed: {}", question, e);
                AnswerOutcome::failed(question, &e)
            }
        }
    }

    #[instrument(skip(self, session, prior), fields(video_id = %session.video.id))]
    async fn answer(
        &self,
        session: &VideoSession,
        question: &str,
        prior: &[AnswerResult],
    ) -> Result<AnswerResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskvidError::InvalidInput("Empty question".to_string()));
        }
        let video_id = session.video_id();

        match self.cache.get(video_id, question) {
            Ok(Some(entry)) => {
                debug!("Cache hit");
                return Ok(AnswerResult {
                    question: question.to_string(),
                    answer_text: entry.answer,
                    timestamps: entry.timestamps,
                    source: AnswerSource::CacheHit,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed, asking the model: {}", e),
        }

        let policy = self.settings.context.neighbor_policy;
        let embedding = session.index.embed_question(question).await;
        let neighbors = match &embedding {
            Some(embedding) if policy != NeighborPolicy::Off => {
                let prior_questions: Vec<String> =
                    prior.iter().map(|p| normalize_question(&p.question)).collect();
                session
                    .index
                    .nearest(embedding, self.settings.context.neighbors)
                    .await
                    .into_iter()
                    .filter(|n| !prior_questions.contains(&n.question))
                    .collect()
            }
            _ => Vec::new(),
        };

        let focus: Vec<Timestamp> = neighbors
            .iter()
            .flat_map(|n| n.timestamps.iter().copied())
            .collect();

        let budget_tokens = self.settings.transcript.context_budget_tokens;
        let transcript = match self.live_remote_handle(session).await {
            Some(handle) => TranscriptContext::Remote {
                cache_id: handle.remote_cache_id,
            },
            None => session.inline_context(budget_tokens, &focus),
        };
        let mut bundle = ContextBundle {
            question: question.to_string(),
            transcript,
            neighbors,
            prior_answers: prior.to_vec(),
        };

        let raw = match self
            .dispatcher
            .dispatch(bundle.to_request(&self.prompts, policy))
            .await
        {
            // The provider may drop a cache before its reported expiry.
            Err(AskvidError::InvalidRequest(message) | AskvidError::AuthFailure(message))
                if matches!(bundle.transcript, TranscriptContext::Remote { .. }) =>
            {
                if let TranscriptContext::Remote { cache_id } = &bundle.transcript {
                    warn!(
                        "Remote cache {} rejected ({}), sending transcript inline",
                        cache_id, message
                    );
                    session.drop_remote_handle(cache_id).await;
                    if let Err(e) = self.cache.discard_remote_handle(video_id, cache_id) {
                        warn!("Could not discard remote cache handle: {}", e);
                    }
                }
                bundle.transcript = session.inline_context(budget_tokens, &focus);
                self.dispatcher
                    .dispatch(bundle.to_request(&self.prompts, policy))
                    .await?
            }
            other => other?,
        };
        let extraction = extract(&raw);

        let entry = CacheEntry::new(
            video_id,
            question,
            extraction.answer_text.clone(),
            extraction.timestamps.clone(),
        )
        .with_embedding(embedding.clone());
        let created_at = entry.created_at;
        if let Err(e) = self.cache.put(video_id, entry) {
            warn!("Could not cache answer: {}", e);
        }
        session
            .index
            .index(
                question,
                &extraction.answer_text,
                extraction.timestamps.clone(),
                embedding,
                created_at,
            )
            .await;

        Ok(AnswerResult {
            question: question.to_string(),
            answer_text: extraction.answer_text,
            timestamps: extraction.timestamps,
            source: AnswerSource::Fresh,
        })
    }

    /// Answer questions in order; each sees the successful answers before it.
    pub async fn run_sequential(
        &self,
        session: &VideoSession,
        questions: &[String],
    ) -> Vec<AnswerOutcome> {
        let mut prior: Vec<AnswerResult> = Vec::new();
        let mut outcomes = Vec::with_capacity(questions.len());

        for question in questions {
            let outcome = self.ask(session, question, &prior).await;
            if let AnswerOutcome::Answered(result) = &outcome {
                prior.push(result.clone());
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Answer all questions concurrently. Outcomes keep the input order.
    pub async fn run_independent(
        &self,
        session: &VideoSession,
        questions: &[String],
    ) -> Vec<AnswerOutcome> {
        join_all(questions.iter().map(|q| self.ask(session, q, &[]))).await
    }

    /// Run a batch in the given mode and build its report.
    #[instrument(skip(self, session, questions), fields(video_id = %session.video.id, count = questions.len()))]
    pub async fn run_batch(
        &self,
        session: &VideoSession,
        questions: &[String],
        mode: BatchMode,
    ) -> BatchReport {
        let outcomes = match mode {
            BatchMode::Sequential => self.run_sequential(session, questions).await,
            BatchMode::Independent => self.run_independent(session, questions).await,
        };

        let report = BatchReport::new(session.video_id(), session.title.clone(), mode, &outcomes);
        info!(
            "Batch finished: {} answered, {} failed",
            report.answered_count(),
            report.failed_count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::generation::testing::ScriptedGenerator;
    use crate::transcript::TranscriptSegment;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        segments: Vec<TranscriptSegment>,
        fetches: AtomicUsize,
    }

    impl FixedSource {
        fn new(segments: Vec<TranscriptSegment>) -> Self {
            Self {
                segments,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscriptSource for FixedSource {
        async fn fetch(&self, video: &VideoRef) -> Result<Vec<TranscriptSegment>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.segments.is_empty() {
                return Err(AskvidError::TranscriptUnavailable(video.id.clone()));
            }
            Ok(self.segments.clone())
        }
    }

    fn segments() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, 30.0, "Welcome to the talk about caching.".into()),
            TranscriptSegment::new(30.0, 90.0, "First we cover invalidation.".into()),
            TranscriptSegment::new(90.0, 150.0, "Then we cover naming things.".into()),
        ]
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.embedding.enabled = false;
        settings.dispatch.base_delay_ms = 1;
        settings.dispatch.max_delay_ms = 5;
        settings
    }

    fn orchestrator(
        dir: &std::path::Path,
        settings: Settings,
        generator: Arc<ScriptedGenerator>,
        source: Arc<FixedSource>,
    ) -> Orchestrator {
        let cache = Arc::new(
            CacheManager::new(dir).with_min_tokens(settings.remote_cache.min_tokens),
        );
        Orchestrator::with_components(settings, Prompts::default(), cache, generator, None, source)
    }

    fn questions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_load_video_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FixedSource::new(segments()));
        let generator = Arc::new(ScriptedGenerator::answering("ok"));
        let orch = orchestrator(dir.path(), settings(), generator.clone(), source.clone());

        let session = orch.load_video("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(session.video_id(), "dQw4w9WgXcQ");
        assert!(!session.transcript().is_empty());
        // Small transcripts never get a remote cache.
        assert!(session.remote_handle().await.is_none());
        assert_eq!(generator.cache_calls.load(Ordering::SeqCst), 0);

        let again = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(again.transcript().len(), session.transcript().len());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_transcript_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            dir.path(),
            settings(),
            Arc::new(ScriptedGenerator::answering("ok")),
            Arc::new(FixedSource::new(Vec::new())),
        );

        let err = orch.load_video("dQw4w9WgXcQ").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::TranscriptUnavailable);
    }

    #[tokio::test]
    async fn test_sequential_answers_feed_later_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new(|i, _| {
            Ok(format!("answer number {} at [00:00:{:02}]", i + 1, 10 + i))
        }));
        let orch = orchestrator(
            dir.path(),
            settings(),
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );
        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();

        let outcomes = orch
            .run_sequential(&session, &questions(&["First question?", "Second question?"]))
            .await;

        assert!(outcomes.iter().all(AnswerOutcome::is_answered));
        let prompts = generator.prompts();
        assert!(!prompts[0].contains("answer number 1"));
        assert!(prompts[1].contains("Q: First question?\nA: answer number 1 at [00:00:10]"));
        assert!(prompts[1].contains("Welcome to the talk"));

        let first = outcomes[0].answer().unwrap();
        assert_eq!(first.source, AnswerSource::Fresh);
        assert_eq!(first.timestamps, vec![Timestamp::new(0, 0, 10).unwrap()]);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::answering("Cached at 01:30."));
        let orch = orchestrator(
            dir.path(),
            settings(),
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );
        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();

        let fresh = orch.ask(&session, "What is covered?", &[]).await;
        let hit = orch.ask(&session, "  what IS covered? ", &[]).await;

        assert_eq!(generator.calls(), 1);
        assert_eq!(fresh.answer().unwrap().source, AnswerSource::Fresh);
        let hit = hit.answer().unwrap();
        assert_eq!(hit.source, AnswerSource::CacheHit);
        assert_eq!(hit.answer_text, "Cached at 01:30.");
        assert_eq!(hit.timestamps, vec![Timestamp::new(0, 1, 30).unwrap()]);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new(|_, request| {
            if request.prompt.contains("bad question") {
                Err(AskvidError::InvalidRequest("rejected".into()))
            } else {
                Ok("fine".into())
            }
        }));
        let orch = orchestrator(
            dir.path(),
            settings(),
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );
        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();

        let report = orch
            .run_batch(
                &session,
                &questions(&["good one?", "bad question?", "another good one?"]),
                BatchMode::Independent,
            )
            .await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].question, "good one?");
        assert_eq!(report.results[1].status, ReportStatus::Failed);
        assert_eq!(report.results[1].error_kind, Some(ErrorKind::InvalidRequest));
        assert_eq!(report.results[2].status, ReportStatus::Answered);

        // Failed answers are not cached.
        assert!(orch.cache().get("dQw4w9WgXcQ", "bad question?").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_transcript_uses_remote_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.remote_cache.min_tokens = 10;
        let generator = Arc::new(ScriptedGenerator::answering("ok").with_remote_cache());
        let orch = orchestrator(
            dir.path(),
            settings,
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );

        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        let again = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(generator.cache_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.remote_handle().await, again.remote_handle().await);

        orch.ask(&session, "What?", &[]).await;
        let requests = generator.requests.lock().unwrap().clone();
        assert_eq!(
            requests[0].remote_cache_id.as_deref(),
            Some("cachedContents/dQw4w9WgXcQ")
        );
        assert!(!requests[0].prompt.contains("Welcome to the talk"));
    }

    #[tokio::test]
    async fn test_remote_cache_failure_falls_back_to_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.remote_cache.min_tokens = 10;
        let generator = Arc::new(ScriptedGenerator::answering("ok"));
        let orch = orchestrator(
            dir.path(),
            settings,
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );

        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        assert!(session.remote_handle().await.is_none());

        orch.ask(&session, "What?", &[]).await;
        assert!(generator.prompts()[0].contains("Welcome to the talk"));
    }

    #[tokio::test]
    async fn test_expired_remote_cache_is_recreated_mid_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.remote_cache.min_tokens = 10;
        settings.remote_cache.ttl_secs = 1;
        let generator = Arc::new(ScriptedGenerator::answering("ok").with_remote_cache());
        let orch = orchestrator(
            dir.path(),
            settings,
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );

        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        assert_eq!(generator.cache_calls.load(Ordering::SeqCst), 1);

        // Handle expiry follows the wall clock.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(session.remote_handle().await.unwrap().is_expired());

        match orch.ask(&session, "What?", &[]).await {
            AnswerOutcome::Answered(result) => assert_eq!(result.answer_text, "ok"),
            other => panic!("expected an answer, got {:?}", other),
        }
        assert_eq!(generator.cache_calls.load(Ordering::SeqCst), 2);
        let requests = generator.requests.lock().unwrap().clone();
        assert_eq!(
            requests[0].remote_cache_id.as_deref(),
            Some("cachedContents/dQw4w9WgXcQ")
        );
        assert!(!requests[0].prompt.contains("Welcome to the talk"));
        assert!(orch.cache().get_remote_handle("dQw4w9WgXcQ").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_remote_cache_is_retried_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.remote_cache.min_tokens = 10;
        let generator = Arc::new(
            ScriptedGenerator::new(|_, request| match request.remote_cache_id {
                Some(_) => Err(AskvidError::InvalidRequest("cached content not found".into())),
                None => Ok("inline answer".to_string()),
            })
            .with_remote_cache(),
        );
        let orch = orchestrator(
            dir.path(),
            settings,
            generator.clone(),
            Arc::new(FixedSource::new(segments())),
        );
        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();
        assert!(session.remote_handle().await.is_some());

        match orch.ask(&session, "What?", &[]).await {
            AnswerOutcome::Answered(result) => assert_eq!(result.answer_text, "inline answer"),
            other => panic!("expected an answer, got {:?}", other),
        }
        assert_eq!(generator.calls(), 2);
        assert!(generator.prompts()[1].contains("Welcome to the talk"));
        assert!(session.remote_handle().await.is_none());
        assert!(orch.cache().get_remote_handle("dQw4w9WgXcQ").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_question_timeout_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.batch.question_timeout_secs = 2;
        let generator =
            Arc::new(ScriptedGenerator::answering("late").with_delay(Duration::from_secs(10)));
        let orch = orchestrator(
            dir.path(),
            settings,
            generator,
            Arc::new(FixedSource::new(segments())),
        );
        let session = orch.load_video("dQw4w9WgXcQ").await.unwrap();

        match orch.ask(&session, "Slow?", &[]).await {
            AnswerOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Cancelled),
            other => panic!("expected a failure, got {:?}", other),
        }
        assert!(orch.cache().get("dQw4w9WgXcQ", "Slow?").unwrap().is_none());
    }
}
