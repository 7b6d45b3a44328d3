//! Per-video SQLite cache store.
//!
//! One database per video keeps a damaged file from affecting any other
//! video, and lets `cache clear` remove a video by deleting its directory.

use super::{CacheEntry, CachedVideo, RemoteCacheHandle};
use crate::error::{AskvidError, Result};
use crate::extract::Timestamp;
use crate::transcript::TranscriptChunk;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// File name of the store inside a video's directory.
pub const STORE_FILE: &str = "cache.db";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        sequence_index INTEGER PRIMARY KEY,
        start_seconds REAL NOT NULL,
        end_seconds REAL NOT NULL,
        text TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS qa_entries (
        question TEXT PRIMARY KEY,
        video_id TEXT NOT NULL,
        answer TEXT NOT NULL,
        timestamps_json TEXT NOT NULL DEFAULT '[]',
        embedding BLOB,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_qa_entries_created_at ON qa_entries(created_at);

    CREATE TABLE IF NOT EXISTS remote_handle (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        video_id TEXT NOT NULL,
        remote_cache_id TEXT NOT NULL,
        expiry_time TEXT NOT NULL,
        token_count INTEGER NOT NULL
    );
"#;

type EntryRow = (String, String, String, Option<Vec<u8>>, String);

/// SQLite store holding one video's chunks, answers and remote cache handle.
pub struct VideoCache {
    video_id: String,
    conn: Mutex<Connection>,
}

impl VideoCache {
    /// Open (or create) the store in `dir`.
    ///
    /// A file that SQLite reports as corrupt or not a database is moved aside
    /// as `cache.db.corrupt-<unix ts>` and replaced with an empty store.
    #[instrument(skip(dir))]
    pub fn open(dir: &Path, video_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);

        let conn = match Self::open_validated(&path) {
            Ok(conn) => conn,
            Err(e) if is_corruption(&e) => {
                let moved_to = quarantine(&path)?;
                warn!(
                    "{}; moved to {:?}, starting with an empty cache",
                    AskvidError::CacheCorruption(e.to_string()),
                    moved_to
                );
                Self::open_validated(&path)?
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Opened cache store at {:?}", path);

        Ok(Self {
            video_id: video_id.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(video_id: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            video_id: video_id.to_string(),
            conn: Mutex::new(conn),
        })
    }

    fn open_validated(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let status: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if status != "ok" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
                Some(status),
            ));
        }

        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AskvidError::Cache(format!("Failed to acquire lock: {}", e)))
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn decode_entry(&self, row: EntryRow) -> Option<CacheEntry> {
        let (question, answer, timestamps_json, embedding, created_at) = row;
        let Some(created_at) = parse_time(&created_at) else {
            warn!("Skipping cached answer for {:?}: bad created_at {:?}", question, created_at);
            return None;
        };

        Some(CacheEntry {
            video_id: self.video_id.clone(),
            question,
            answer,
            timestamps: decode_timestamps(&timestamps_json),
            embedding: embedding.as_deref().map(Self::bytes_to_embedding),
            created_at,
        })
    }

    /// Look up an entry by normalized question.
    pub fn get_entry(&self, question: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT question, answer, timestamps_json, embedding, created_at
                 FROM qa_entries WHERE question = ?1",
                params![question],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        Ok(row.and_then(|row| self.decode_entry(row)))
    }

    /// Insert or replace an entry in one transaction.
    pub fn put_entry(&self, entry: &CacheEntry) -> Result<()> {
        let timestamps_json = serde_json::to_string(&entry.timestamps)?;
        let embedding = entry.embedding.as_deref().map(Self::embedding_to_bytes);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO qa_entries
            (question, video_id, answer, timestamps_json, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.question,
                self.video_id,
                entry.answer,
                timestamps_json,
                embedding,
                format_time(&entry.created_at),
            ],
        )?;
        touch(&tx)?;
        tx.commit()?;

        debug!("Stored answer for {:?}", entry.question);
        Ok(())
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT question, answer, timestamps_json, embedding, created_at
             FROM qa_entries ORDER BY created_at, question",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            match row {
                Ok(row) => entries.extend(self.decode_entry(row)),
                Err(e) => warn!("Skipping unreadable cached answer: {}", e),
            }
        }
        Ok(entries)
    }

    /// Attach an embedding to an existing entry. Returns false if absent.
    pub fn set_embedding(&self, question: &str, embedding: &[f32]) -> Result<bool> {
        let bytes = Self::embedding_to_bytes(embedding);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE qa_entries SET embedding = ?1 WHERE question = ?2",
            params![bytes, question],
        )?;
        tx.commit()?;

        Ok(updated > 0)
    }

    /// Replace the stored transcript chunks.
    pub fn store_chunks(&self, title: Option<&str>, chunks: &[TranscriptChunk]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (sequence_index, start_seconds, end_seconds, text)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.sequence_index as i64,
                    chunk.start_seconds,
                    chunk.end_seconds,
                    chunk.text,
                ])?;
            }
        }

        if let Some(title) = title {
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('title', ?1)",
                params![title],
            )?;
        }
        touch(&tx)?;
        tx.commit()?;

        info!("Cached {} transcript chunks for {}", chunks.len(), self.video_id);
        Ok(())
    }

    /// Stored transcript chunks in sequence order.
    pub fn chunks(&self) -> Result<Vec<TranscriptChunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sequence_index, start_seconds, end_seconds, text
             FROM chunks ORDER BY sequence_index",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let decoded = row
                .map_err(AskvidError::from)
                .and_then(|(idx, start, end, text)| TranscriptChunk::new(start, end, text, idx as usize));
            match decoded {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!("Skipping cached chunk: {}", e),
            }
        }
        Ok(chunks)
    }

    pub fn title(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        meta_value(&conn, "title")
    }

    /// Stored remote cache handle, expired or not.
    pub fn remote_handle(&self) -> Result<Option<RemoteCacheHandle>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT remote_cache_id, expiry_time, token_count FROM remote_handle WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((remote_cache_id, expiry_time, token_count)) = row else {
            return Ok(None);
        };
        let Some(expiry_time) = parse_time(&expiry_time) else {
            warn!("Ignoring remote cache handle with bad expiry {:?}", expiry_time);
            return Ok(None);
        };

        Ok(Some(RemoteCacheHandle {
            video_id: self.video_id.clone(),
            remote_cache_id,
            expiry_time,
            token_count: token_count.max(0) as usize,
        }))
    }

    pub fn set_remote_handle(&self, handle: &RemoteCacheHandle) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO remote_handle
            (id, video_id, remote_cache_id, expiry_time, token_count)
            VALUES (1, ?1, ?2, ?3, ?4)
            "#,
            params![
                self.video_id,
                handle.remote_cache_id,
                format_time(&handle.expiry_time),
                handle.token_count as i64,
            ],
        )?;
        touch(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_remote_handle(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM remote_handle", [])?;
        Ok(())
    }

    /// Counts and metadata for listings.
    pub fn summary(&self) -> Result<CachedVideo> {
        let conn = self.lock()?;
        let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM qa_entries", [], |row| row.get(0))?;

        Ok(CachedVideo {
            video_id: self.video_id.clone(),
            title: meta_value(&conn, "title")?,
            chunk_count: chunk_count as usize,
            entry_count: entry_count as usize,
            updated_at: meta_value(&conn, "updated_at")?.as_deref().and_then(parse_time),
        })
    }
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

/// Move a damaged store (and its WAL side files) out of the way.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let target = path.with_file_name(format!("{}.corrupt-{}", STORE_FILE, Utc::now().timestamp()));
    std::fs::rename(path, &target)?;

    for suffix in ["-wal", "-shm"] {
        let side = path.with_file_name(format!("{}{}", STORE_FILE, suffix));
        if side.exists() {
            std::fs::remove_file(&side)?;
        }
    }
    Ok(target)
}

fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

fn touch(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('updated_at', ?1)",
        params![format_time(&Utc::now())],
    )?;
    Ok(())
}

// Fixed-width so the text column sorts chronologically.
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn decode_timestamps(raw: &str) -> Vec<Timestamp> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(items) => items
            .iter()
            .filter_map(|s| Timestamp::parse_candidate(s))
            .collect(),
        Err(e) => {
            warn!("Unreadable timestamps column ({}), treating as empty", e);
            Vec::new()
        }
    }
}
