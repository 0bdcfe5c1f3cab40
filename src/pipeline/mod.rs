pub mod citations;
pub mod classify;
pub mod confidence;
pub mod context;
pub mod dates;
pub mod dedup;
pub mod demographics;
pub mod events;
pub mod extraction;
pub mod import;
pub mod processor; // Run orchestrator
pub mod providers;
pub mod receipt;
pub mod segment;
pub mod validate;
