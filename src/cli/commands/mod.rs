//! CLI command implementations.

mod ask;
mod batch;
mod cache;
mod config;
mod load;

pub use ask::run_ask;
pub use batch::{load_questions, run_batch};
pub use cache::run_cache;
pub use config::run_config;
pub use load::run_load;

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Check requirements for asking and build the orchestrator.
fn ask_orchestrator(settings: Settings) -> Result<Orchestrator> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }
    Ok(Orchestrator::new(settings)?)
}
