//! Cache inspection commands.

use crate::cache::CacheManager;
use crate::cli::preflight::{self, Operation};
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use crate::transcript::VideoRef;
use anyhow::Result;

/// Run a cache subcommand.
pub fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Cache, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }
    let cache = CacheManager::new(settings.videos_dir());

    match action {
        CacheAction::List => {
            let videos = cache.list_videos()?;
            if videos.is_empty() {
                Output::info("No cached videos yet. Use 'askvid load <url>' to add one.");
                return Ok(());
            }

            Output::header(&format!("Cached Videos ({})", videos.len()));
            println!();
            for video in &videos {
                Output::video_info(video);
            }

            let answers: usize = videos.iter().map(|v| v.entry_count).sum();
            println!();
            Output::kv("Total videos", &videos.len().to_string());
            Output::kv("Total answers", &answers.to_string());
        }

        CacheAction::Show { video } => {
            let video_id = VideoRef::parse(video).id;
            let entries = cache.entries(&video_id)?;
            if entries.is_empty() {
                Output::info(&format!("No cached answers for {}", video_id));
                return Ok(());
            }

            Output::header(&format!("Cached Answers for {} ({})", video_id, entries.len()));
            for entry in &entries {
                Output::cached_answer(&entry.question, &entry.answer, &entry.timestamps);
            }
        }

        CacheAction::Clear { video } => {
            let video_id = VideoRef::parse(video).id;
            if cache.clear(&video_id)? {
                Output::success(&format!("Cleared cache for {}", video_id));
            } else {
                Output::warning(&format!("Nothing cached for {}", video_id));
            }
        }
    }

    Ok(())
}
