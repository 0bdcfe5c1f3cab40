//! Cross-checks derived from the assembled graph: contradiction pairs and
//! the two narrative readings. Nothing here re-reads page text.

mod contradictions;
mod narrative;

pub use contradictions::*;
pub use narrative::*;

use crate::models::{Event, EvidenceGraph};
use crate::pipeline_config::RunConfig;

/// Fill the contradiction and narrative extension blocks.
pub fn apply_cross_checks(graph: &mut EvidenceGraph, config: &RunConfig) {
    let events: Vec<&Event> = graph.chronology_events().collect();
    let matrix = build_contradictions(&events, config.contradiction_window_days);
    let duality = build_narrative(&events, &matrix, &graph.gaps);
    graph.extensions.contradiction_matrix = Some(matrix);
    graph.extensions.narrative_duality = Some(duality);
}
