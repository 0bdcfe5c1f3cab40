//! Run receipt: output hash, metrics and provenance.

use sha2::{Digest, Sha256};

use crate::config::{APP_VERSION, EXTRACTOR_NAME};
use crate::export::ExportError;
use crate::models::{EventType, EvidenceGraph, Provenance, RunMetrics, TextSource};

/// SHA-256 over the flattened CSV followed by the canonical graph JSON.
/// The graph carries no timestamps, so equal runs hash equal.
pub fn outputs_hash(graph: &EvidenceGraph, csv: &[u8]) -> Result<String, ExportError> {
    let json = serde_json::to_vec(graph)?;
    let mut hasher = Sha256::new();
    hasher.update(csv);
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Counts derived from the graph. Timing and cache fields are left to the runner.
pub fn compute_metrics(graph: &EvidenceGraph) -> RunMetrics {
    RunMetrics {
        documents: graph.source_documents.len(),
        pages_total: graph.pages.len(),
        pages_ocr: graph.pages.iter().filter(|p| p.text_source == TextSource::Ocr).count(),
        events_total: graph.events.len(),
        events_exported: graph.chronology.len(),
        providers_total: graph.providers.len(),
        pt_events: graph.events.iter().filter(|e| e.event_type == EventType::PtVisit).count(),
        billing_events: graph.events.iter().filter(|e| e.event_type == EventType::Billing).count(),
        gaps_total: graph.gaps.len(),
        processing_ms: 0,
        cache_hit: false,
    }
}

pub fn provenance(inputs_hash: &str, config_hash: &str, ocr_engine: Option<&str>) -> Provenance {
    Provenance {
        pipeline_version: APP_VERSION.to_string(),
        extractor: EXTRACTOR_NAME.to_string(),
        ocr_engine: ocr_engine.map(str::to_string),
        inputs_hash: inputs_hash.to_string(),
        config_hash: config_hash.to_string(),
        outputs_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_hash_is_stable_and_sensitive() {
        let graph = EvidenceGraph {
            schema_version: "1.0".into(),
            matter_id: "m".into(),
            ..EvidenceGraph::default()
        };
        let a = outputs_hash(&graph, b"event_id\n").unwrap();
        let b = outputs_hash(&graph, b"event_id\n").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, outputs_hash(&graph, b"event_id,date\n").unwrap());

        let other = EvidenceGraph {
            matter_id: "n".into(),
            ..graph.clone()
        };
        assert_ne!(a, outputs_hash(&other, b"event_id\n").unwrap());
    }

    #[test]
    fn provenance_carries_versions() {
        let p = provenance("in", "cfg", Some("tesseract"));
        assert_eq!(p.pipeline_version, APP_VERSION);
        assert_eq!(p.extractor, EXTRACTOR_NAME);
        assert!(p.outputs_hash.is_none());
    }

    #[test]
    fn empty_graph_metrics() {
        let metrics = compute_metrics(&EvidenceGraph::default());
        assert_eq!(metrics, RunMetrics::default());
    }
}
