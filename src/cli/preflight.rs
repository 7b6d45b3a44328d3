//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and credentials are available before a
//! command starts work that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{AskvidError, Result};
use std::path::Path;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Loading a video needs yt-dlp unless the transcript is cached.
    Load,
    /// Asking questions needs the generation provider's API key.
    Ask,
    /// Cache inspection needs a readable video cache directory.
    Cache,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Load => {
            check_tool("yt-dlp")?;
        }
        Operation::Ask => {
            check_api_key(settings.generation.provider.api_key_var())?;
            if settings.embedding.enabled {
                check_api_key("OPENAI_API_KEY")?;
            }
        }
        Operation::Cache => {
            check_cache_dir(&settings.videos_dir())?;
        }
    }
    Ok(())
}

/// A missing directory is fine, it is created on first load.
fn check_cache_dir(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(AskvidError::Config(format!(
            "{} is not a directory. Point general.data_dir elsewhere",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AskvidError::Config(format!(
            "Cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn check_api_key(var: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        Ok(_) => Err(AskvidError::Config(format!(
            "{var} is empty. Set it with: export {var}='...'"
        ))),
        Err(_) => Err(AskvidError::Config(format!(
            "{var} not set. Set it with: export {var}='...'"
        ))),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(AskvidError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AskvidError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(AskvidError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
