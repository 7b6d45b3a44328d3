//! Transcript collaborators.

use super::vtt::parse_vtt;
use super::{TranscriptSegment, VideoRef};
use crate::error::{AskvidError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Supplies caption segments for a video.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch ordered transcript segments.
    ///
    /// A video without captions yields `TranscriptUnavailable`, never a
    /// network or tool error.
    async fn fetch(&self, video: &VideoRef) -> Result<Vec<TranscriptSegment>>;
}

/// Downloads WebVTT subtitles with yt-dlp.
pub struct YtDlpTranscriptSource {
    temp_dir: PathBuf,
    language: String,
}

impl YtDlpTranscriptSource {
    pub fn new(temp_dir: impl Into<PathBuf>, language: &str) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            language: language.to_string(),
        }
    }

    /// Locate the subtitle file yt-dlp wrote for this video.
    fn find_vtt(dir: &Path) -> Result<Option<PathBuf>> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "vtt"))
            .collect();
        // Shortest name first: `x.en.vtt` wins over `x.en-orig.vtt` or `x.en-US.vtt`.
        found.sort_by_key(|p| (p.as_os_str().len(), p.clone()));
        Ok(found.into_iter().next())
    }
}

#[async_trait]
impl TranscriptSource for YtDlpTranscriptSource {
    #[instrument(skip(self), fields(video_id = %video.id))]
    async fn fetch(&self, video: &VideoRef) -> Result<Vec<TranscriptSegment>> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let work_dir = tempfile::tempdir_in(&self.temp_dir)?;
        let template = work_dir.path().join(&video.id);

        info!("Downloading subtitles from {}", video.url);

        let result = Command::new("yt-dlp")
            .arg("--skip-download")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs").arg(format!("{}.*", self.language))
            .arg("--sub-format").arg("vtt")
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--output").arg(template.to_str().unwrap_or_default())
            .arg(&video.url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AskvidError::ToolNotFound("yt-dlp".into()));
            }
            Err(e) => {
                return Err(AskvidError::VideoSource(format!("yt-dlp execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("subtitle") {
                return Err(AskvidError::TranscriptUnavailable(video.id.clone()));
            }
            return Err(AskvidError::VideoSource(format!("yt-dlp failed: {stderr}")));
        }

        let Some(vtt_path) = Self::find_vtt(work_dir.path())? else {
            return Err(AskvidError::TranscriptUnavailable(video.id.clone()));
        };
        debug!("Parsing subtitles from {:?}", vtt_path);

        let content = tokio::fs::read_to_string(&vtt_path).await?;
        let segments = parse_vtt(&content);
        if segments.is_empty() {
            return Err(AskvidError::TranscriptUnavailable(video.id.clone()));
        }

        info!("Fetched {} caption segments", segments.len());
        Ok(segments)
    }
}
