use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Citeline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version stamped into every serialized evidence graph.
/// Fields are only ever appended, so readers of older versions keep working.
pub const SCHEMA_VERSION: &str = "1.0";

/// Extractor name recorded in run provenance.
pub const EXTRACTOR_NAME: &str = "citeline-deterministic";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    format!("{}=info,warn", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join(APP_NAME),
        None => PathBuf::from(".").join(APP_NAME),
    }
}

/// Default location of the run/graph cache database
pub fn default_store_path() -> PathBuf {
    app_data_dir().join("runs.db")
}
