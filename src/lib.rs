pub mod billing; // Ledger + specials
pub mod config;
pub mod crosscheck; // Contradictions + dual narrative
pub mod db;
pub mod export; // CSV + provider directory
pub mod ids;
pub mod models;
pub mod pipeline;
pub mod pipeline_config;
pub mod timeline; // Chronology, gaps, record requests

use tracing_subscriber::EnvFilter;

pub use pipeline::processor::{build_runner, PipelineRunner, RunOutcome};
pub use pipeline_config::RunConfig;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
