//! Flattened outputs derived from a finished graph.

mod billing;
mod csv;
mod directory;

pub use self::csv::*;
pub use billing::*;
pub use directory::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
