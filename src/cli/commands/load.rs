//! Load command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{Orchestrator, VideoSession};
use crate::transcript::VideoRef;
use anyhow::Result;
use std::sync::Arc;

/// Load a video, fetching the transcript with yt-dlp when it is not cached.
pub(super) async fn load_session(orchestrator: &Orchestrator, url: &str) -> Result<Arc<VideoSession>> {
    let video = VideoRef::parse(url);
    if orchestrator.cache().chunks(&video.id)?.is_empty() {
        if let Err(e) = preflight::check(Operation::Load, orchestrator.settings()) {
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    }

    let spinner = Output::spinner(&format!("Loading {}...", video.id));
    let session = orchestrator.load_video(url).await;
    spinner.finish_and_clear();

    match session {
        Ok(session) => Ok(session),
        Err(e) => {
            Output::error(&format!("Failed to load video: {}", e));
            Err(e.into())
        }
    }
}

/// Run the load command.
pub async fn run_load(url: &str, settings: Settings) -> Result<()> {
    let orchestrator = super::ask_orchestrator(settings)?;
    let session = load_session(&orchestrator, url).await?;

    Output::success(&format!("Loaded {}", session.video_id()));
    Output::kv(
        "Provider",
        &format!(
            "{} ({})",
            orchestrator.settings().generation.provider,
            orchestrator.settings().generation.model
        ),
    );
    if let Some(title) = &session.title {
        Output::kv("Title", title);
    }
    Output::kv("Chunks", &session.transcript().len().to_string());
    Output::kv(
        "Estimated tokens",
        &session.transcript().estimated_tokens().to_string(),
    );
    Output::kv("Cached answers", &session.index().len().await.to_string());

    match session.remote_handle().await {
        Some(handle) => Output::kv(
            "Remote cache",
            &format!(
                "{} (expires {})",
                handle.remote_cache_id,
                handle.expiry_time.format("%Y-%m-%d %H:%M UTC")
            ),
        ),
        None => Output::kv("Remote cache", "not used, transcript is sent inline"),
    }

    Ok(())
}
