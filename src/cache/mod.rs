//! Persistent answer cache and remote transcript cache handles.
//!
//! Each video gets its own store under `<data_dir>/videos/<video_id>/`.
//! The manager opens stores lazily and keeps them for the session.

mod store;

pub use store::{VideoCache, STORE_FILE};

use crate::error::{AskvidError, Result};
use crate::extract::Timestamp;
use crate::transcript::TranscriptChunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Estimated transcript tokens at which a remote cache becomes worthwhile.
pub const REMOTE_CACHE_MIN_TOKENS: usize = 32_768;

/// Normalize a question for cache lookups: case-fold, trim, collapse whitespace.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A cached answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub video_id: String,
    /// Normalized question text.
    pub question: String,
    pub answer: String,
    pub timestamps: Vec<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        video_id: impl Into<String>,
        question: &str,
        answer: impl Into<String>,
        timestamps: Vec<Timestamp>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            question: normalize_question(question),
            answer: answer.into(),
            timestamps,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Reference to transcript content cached on the model provider's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheHandle {
    pub video_id: String,
    pub remote_cache_id: String,
    pub expiry_time: DateTime<Utc>,
    pub token_count: usize,
}

impl RemoteCacheHandle {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }
}

/// Listing information about a cached video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVideo {
    pub video_id: String,
    pub title: Option<String>,
    pub chunk_count: usize,
    pub entry_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Session-scoped access to the per-video stores.
pub struct CacheManager {
    root: PathBuf,
    min_tokens: usize,
    stores: Mutex<HashMap<String, Arc<VideoCache>>>,
    /// Per-video creation lock; the flag is set once creation failed this session.
    remote_attempts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<bool>>>>,
}

impl CacheManager {
    /// Create a manager rooted at `root` (normally `<data_dir>/videos`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_tokens: REMOTE_CACHE_MIN_TOKENS,
            stores: Mutex::new(HashMap::new()),
            remote_attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Override the remote cache threshold.
    pub fn with_min_tokens(mut self, min_tokens: usize) -> Self {
        self.min_tokens = min_tokens;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (once per session) the store for a video.
    pub fn store(&self, video_id: &str) -> Result<Arc<VideoCache>> {
        validate_video_id(video_id)?;

        let mut stores = self
            .stores
            .lock()
            .map_err(|e| AskvidError::Cache(format!("Failed to acquire lock: {}", e)))?;

        if let Some(store) = stores.get(video_id) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(VideoCache::open(&self.root.join(video_id), video_id)?);
        stores.insert(video_id.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Exact-match lookup after normalization.
    pub fn get(&self, video_id: &str, question: &str) -> Result<Option<CacheEntry>> {
        self.store(video_id)?.get_entry(&normalize_question(question))
    }

    /// Insert or overwrite the entry for its normalized question.
    pub fn put(&self, video_id: &str, mut entry: CacheEntry) -> Result<()> {
        entry.question = normalize_question(&entry.question);
        entry.video_id = video_id.to_string();
        self.store(video_id)?.put_entry(&entry)
    }

    /// All cached answers for a video, oldest first.
    pub fn entries(&self, video_id: &str) -> Result<Vec<CacheEntry>> {
        self.store(video_id)?.entries()
    }

    pub fn set_embedding(&self, video_id: &str, question: &str, embedding: &[f32]) -> Result<bool> {
        self.store(video_id)?
            .set_embedding(&normalize_question(question), embedding)
    }

    pub fn store_chunks(
        &self,
        video_id: &str,
        title: Option<&str>,
        chunks: &[TranscriptChunk],
    ) -> Result<()> {
        self.store(video_id)?.store_chunks(title, chunks)
    }

    pub fn chunks(&self, video_id: &str) -> Result<Vec<TranscriptChunk>> {
        self.store(video_id)?.chunks()
    }

    pub fn title(&self, video_id: &str) -> Result<Option<String>> {
        self.store(video_id)?.title()
    }

    /// Current remote cache handle, dropping it if expired.
    pub fn get_remote_handle(&self, video_id: &str) -> Result<Option<RemoteCacheHandle>> {
        let store = self.store(video_id)?;
        match store.remote_handle()? {
            Some(handle) if handle.is_expired() => {
                debug!(
                    "Remote cache {} for {} expired at {}",
                    handle.remote_cache_id, video_id, handle.expiry_time
                );
                store.clear_remote_handle()?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Forget a handle the provider no longer honors. A newer handle stored
    /// under a different id is kept.
    pub fn discard_remote_handle(&self, video_id: &str, remote_cache_id: &str) -> Result<bool> {
        let store = self.store(video_id)?;
        match store.remote_handle()? {
            Some(handle) if handle.remote_cache_id == remote_cache_id => {
                store.clear_remote_handle()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Return a valid remote cache handle, creating one when the transcript
    /// is large enough.
    ///
    /// `create_fn` runs at most once per video for the lifetime of this
    /// manager unless a previously created handle has since expired. A
    /// failed creation is logged and remembered, and the caller falls back
    /// to inlining the transcript.
    #[instrument(skip(self, create_fn))]
    pub async fn create_remote_handle_if_warranted<F, Fut>(
        &self,
        video_id: &str,
        transcript_token_count: usize,
        create_fn: F,
    ) -> Option<RemoteCacheHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RemoteCacheHandle>>,
    {
        if transcript_token_count < self.min_tokens {
            debug!(
                "Transcript ~{} tokens is below the {} token remote cache threshold",
                transcript_token_count, self.min_tokens
            );
            return None;
        }

        let attempt = match self.remote_attempt(video_id) {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!("Remote cache unavailable for {}: {}", video_id, e);
                return None;
            }
        };
        let mut failed = attempt.lock().await;

        match self.get_remote_handle(video_id) {
            Ok(Some(handle)) => return Some(handle),
            Ok(None) => {}
            Err(e) => warn!("Could not read remote cache handle for {}: {}", video_id, e),
        }

        if *failed {
            debug!("Remote cache creation already failed this session for {}", video_id);
            return None;
        }

        match create_fn().await {
            Ok(handle) => {
                info!(
                    "Created remote cache {} for {} (expires {})",
                    handle.remote_cache_id, video_id, handle.expiry_time
                );
                if let Err(e) = self
                    .store(video_id)
                    .and_then(|store| store.set_remote_handle(&handle))
                {
                    warn!("Could not persist remote cache handle for {}: {}", video_id, e);
                }
                Some(handle)
            }
            Err(e) => {
                warn!("Remote cache creation failed for {}: {}", video_id, e);
                *failed = true;
                None
            }
        }
    }

    fn remote_attempt(&self, video_id: &str) -> Result<Arc<tokio::sync::Mutex<bool>>> {
        let mut attempts = self
            .remote_attempts
            .lock()
            .map_err(|e| AskvidError::Cache(format!("Failed to acquire lock: {}", e)))?;
        Ok(Arc::clone(attempts.entry(video_id.to_string()).or_default()))
    }

    /// Summaries of every cached video, sorted by id.
    pub fn list_videos(&self) -> Result<Vec<CachedVideo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut videos = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if !path.join(STORE_FILE).exists() {
                continue;
            }
            let video_id = entry.file_name().to_string_lossy().to_string();
            match self.store(&video_id).and_then(|store| store.summary()) {
                Ok(summary) => videos.push(summary),
                Err(e) => warn!("Skipping cache for {}: {}", video_id, e),
            }
        }

        videos.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        Ok(videos)
    }

    /// Delete everything cached for a video. Returns false if nothing was cached.
    pub fn clear(&self, video_id: &str) -> Result<bool> {
        validate_video_id(video_id)?;

        if let Ok(mut stores) = self.stores.lock() {
            stores.remove(video_id);
        }
        if let Ok(mut attempts) = self.remote_attempts.lock() {
            attempts.remove(video_id);
        }

        let dir = self.root.join(video_id);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        info!("Cleared cache for {}", video_id);
        Ok(true)
    }
}

fn validate_video_id(video_id: &str) -> Result<()> {
    if video_id.is_empty()
        || video_id.starts_with('.')
        || video_id.contains(['/', '\\'])
    {
        return Err(AskvidError::InvalidInput(format!(
            "Not a usable video id: {:?}",
            video_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handle(video_id: &str, expires_in: Duration) -> RemoteCacheHandle {
        RemoteCacheHandle {
            video_id: video_id.to_string(),
            remote_cache_id: "cachedContents/abc".to_string(),
            expiry_time: Utc::now() + expires_in,
            token_count: 40_000,
        }
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(normalize_question("  What IS\tthis\n about? "), "what is this about?");
        assert_eq!(normalize_question(""), "");
    }

    #[test]
    fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());

        let entry = CacheEntry::new(
            "vid",
            "What is Rust?",
            "A language, see 00:01:00.",
            vec![Timestamp::new(0, 1, 0).unwrap()],
        )
        .with_embedding(Some(vec![0.5, 0.25]));

        cache.put("vid", entry.clone()).unwrap();
        cache.put("vid", entry.clone()).unwrap();

        assert_eq!(cache.entries("vid").unwrap().len(), 1);
        let found = cache.get("vid", "  what is   RUST? ").unwrap().unwrap();
        assert_eq!(found, entry);
    }

    #[test]
    fn test_put_overwrites_answer() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());

        cache.put("vid", CacheEntry::new("vid", "Q?", "first", Vec::new())).unwrap();
        cache.put("vid", CacheEntry::new("vid", "q?", "second", Vec::new())).unwrap();

        let entries = cache.entries("vid").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].answer, "second");
        assert!(cache.get("other", "q?").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = CacheManager::new(dir.path());
            cache.put("vid", CacheEntry::new("vid", "Q?", "A.", Vec::new())).unwrap();
        }

        let cache = CacheManager::new(dir.path());
        assert_eq!(cache.get("vid", "q?").unwrap().unwrap().answer, "A.");
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let video_dir = dir.path().join("vid");
        std::fs::create_dir_all(&video_dir).unwrap();
        std::fs::write(video_dir.join(STORE_FILE), "garbage ".repeat(1000)).unwrap();

        let cache = CacheManager::new(dir.path());
        assert!(cache.get("vid", "anything").unwrap().is_none());

        cache.put("vid", CacheEntry::new("vid", "Q?", "A.", Vec::new())).unwrap();
        assert!(cache.get("vid", "q?").unwrap().is_some());
    }

    #[test]
    fn test_set_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        cache.put("vid", CacheEntry::new("vid", "Q?", "A.", Vec::new())).unwrap();

        assert!(cache.set_embedding("vid", "Q?", &[1.0, 2.0]).unwrap());
        assert!(!cache.set_embedding("vid", "missing", &[1.0]).unwrap());
        assert_eq!(
            cache.get("vid", "q?").unwrap().unwrap().embedding,
            Some(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_expired_handle_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());

        let store = cache.store("vid").unwrap();
        store.set_remote_handle(&handle("vid", Duration::seconds(-5))).unwrap();

        assert!(cache.get_remote_handle("vid").unwrap().is_none());
        assert!(store.remote_handle().unwrap().is_none());

        store.set_remote_handle(&handle("vid", Duration::hours(1))).unwrap();
        assert!(cache.get_remote_handle("vid").unwrap().is_some());
    }

    #[test]
    fn test_discard_only_matching_handle() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let store = cache.store("vid").unwrap();
        store.set_remote_handle(&handle("vid", Duration::hours(1))).unwrap();

        assert!(!cache.discard_remote_handle("vid", "cachedContents/other").unwrap());
        assert!(cache.get_remote_handle("vid").unwrap().is_some());

        assert!(cache.discard_remote_handle("vid", "cachedContents/abc").unwrap());
        assert!(cache.get_remote_handle("vid").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_handle_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let calls = AtomicUsize::new(0);

        let first = cache
            .create_remote_handle_if_warranted("vid", REMOTE_CACHE_MIN_TOKENS, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(handle("vid", Duration::seconds(-1))) }
            })
            .await;
        assert!(first.is_some());

        let second = cache
            .create_remote_handle_if_warranted("vid", REMOTE_CACHE_MIN_TOKENS, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(handle("vid", Duration::hours(1))) }
            })
            .await
            .unwrap();
        assert!(!second.is_expired());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remote_handle_below_threshold_never_creates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let calls = AtomicUsize::new(0);

        let result = cache
            .create_remote_handle_if_warranted("vid", REMOTE_CACHE_MIN_TOKENS - 1, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(handle("vid", Duration::hours(1))) }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_handle_created_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let calls = AtomicUsize::new(0);

        let create = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::task::yield_now().await;
                Ok(handle("vid", Duration::hours(1)))
            }
        };

        let (a, b) = tokio::join!(
            cache.create_remote_handle_if_warranted("vid", REMOTE_CACHE_MIN_TOKENS, create),
            cache.create_remote_handle_if_warranted("vid", REMOTE_CACHE_MIN_TOKENS, create),
        );
        let c = cache
            .create_remote_handle_if_warranted("vid", 100_000, create)
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().remote_cache_id, "cachedContents/abc");
        assert_eq!(b, c);
        assert!(cache.get_remote_handle("vid").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = cache
                .create_remote_handle_if_warranted("vid", 50_000, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(AskvidError::TransientApiFailure("boom".into())) }
                })
                .await;
            assert!(result.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        cache.put("bbb", CacheEntry::new("bbb", "Q?", "A.", Vec::new())).unwrap();
        cache.store_chunks("aaa", Some("Title"), &[]).unwrap();

        let videos = cache.list_videos().unwrap();
        assert_eq!(
            videos.iter().map(|v| v.video_id.as_str()).collect::<Vec<_>>(),
            vec!["aaa", "bbb"]
        );
        assert_eq!(videos[0].title.as_deref(), Some("Title"));
        assert_eq!(videos[1].entry_count, 1);

        assert!(cache.clear("bbb").unwrap());
        assert!(!cache.clear("bbb").unwrap());
        assert_eq!(cache.list_videos().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        assert!(cache.get("../escape", "q").is_err());
        assert!(cache.get("", "q").is_err());
    }
}
