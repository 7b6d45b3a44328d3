//! CLI module for askvid.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::GenerationProvider;
use clap::{Parser, Subcommand};

/// askvid - ask questions about YouTube videos
///
/// Fetches a video's transcript once, caches every answer, and reuses
/// earlier answers as context for related questions.
#[derive(Parser, Debug)]
#[command(name = "askvid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Answer-generation provider (openai or gemini), overriding the config
    #[arg(short, long, global = true, env = "ASKVID_PROVIDER")]
    pub provider: Option<GenerationProvider>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and cache a video's transcript
    Load {
        /// YouTube URL or video ID
        url: String,
    },

    /// Ask questions interactively (a blank line ends the session)
    Ask {
        /// YouTube URL or video ID
        url: String,
    },

    /// Answer a set of questions and write a JSON report
    Batch {
        /// YouTube URL or video ID
        url: String,

        /// Question file: a JSON array, or one question per line
        #[arg(short, long)]
        questions: Option<String>,

        /// Report path (defaults to batch.output from the config)
        #[arg(short, long)]
        output: Option<String>,

        /// Answer questions concurrently, without earlier answers as context
        #[arg(long)]
        independent: bool,
    },

    /// Inspect or clear cached videos
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached videos
    List,

    /// Show cached answers for a video
    Show {
        /// Video ID or URL
        video: String,
    },

    /// Delete a video's cache
    Clear {
        /// Video ID or URL
        video: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
