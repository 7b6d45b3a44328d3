//! Configuration module for askvid.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnswerPrompts, Prompts};
pub use settings::{
    BatchSettings, ContextSettings, DispatchSettings, EmbeddingSettings, GeneralSettings,
    GenerationProvider, GenerationSettings, NeighborPolicy, PromptSettings, RemoteCacheSettings,
    Settings, TranscriptSettings,
};
