//! Chronology assembly and missing-record detection.
//!
//! Runs after scoring. Decides which events are exported and in what order,
//! then looks for stretches of time with no treatment records, globally and
//! per provider, and turns provider gaps into records requests.

mod chronology;
mod gaps;
mod requests;

pub use chronology::*;
pub use gaps::*;
pub use requests::*;
