//! askvid - YouTube transcript Q&A with cached answers
//!
//! Answers natural-language questions about a video's spoken content.
//! Each answer cites `HH:MM:SS` timestamps and is cached per video, so a
//! repeated question never reaches the model twice.
//!
//! # Architecture
//!
//! - `transcript` - Caption fetching, parsing and chunking
//! - `cache` - Per-video SQLite store and remote cache handles
//! - `semantic` - Similarity search over earlier questions
//! - `dispatch` - Rate-limited, retrying model requests
//! - `generation` - Answer generators (OpenAI, Gemini)
//! - `extract` - Timestamp extraction from answers
//! - `orchestrator` - Single, sequential and independent question runs
//! - `config` - Settings and prompt templates
//!
//! # Example
//!
//! ```rust,no_run
//! use askvid::config::Settings;
//! use askvid::orchestrator::{BatchMode, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let session = orchestrator.load_video("dQw4w9WgXcQ").await?;
//!     let questions = vec!["What is the main topic?".to_string()];
//!     let report = orchestrator
//!         .run_batch(&session, &questions, BatchMode::Sequential)
//!         .await;
//!     println!("{} answered", report.answered_count());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod semantic;
pub mod transcript;

pub use error::{AskvidError, Result};
