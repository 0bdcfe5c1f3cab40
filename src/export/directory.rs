use std::collections::BTreeSet;

use crate::models::{DirectoryEntry, EvidenceGraph};

/// Per-provider summary, ordered by first appearance in the record.
/// Providers never linked to a dated event sort last.
pub fn build_provider_directory(graph: &EvidenceGraph) -> Vec<DirectoryEntry> {
    let mut entries: Vec<DirectoryEntry> = graph
        .providers
        .iter()
        .map(|provider| {
            let mut citations: BTreeSet<&str> =
                provider.evidence.iter().map(|e| e.citation_id.as_str()).collect();
            for event in graph
                .events
                .iter()
                .filter(|e| e.provider_id.as_deref() == Some(provider.provider_id.as_str()))
            {
                citations.extend(event.citation_ids.iter().map(String::as_str));
            }

            DirectoryEntry {
                provider_id: provider.provider_id.clone(),
                display_name: provider.display_name.clone(),
                kind: provider.kind,
                care_setting: provider.care_setting,
                first_seen: provider.first_seen,
                last_seen: provider.last_seen,
                event_count: provider.event_count,
                citation_count: citations.len() as u32,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        (a.first_seen.is_none(), a.first_seen, &a.provider_id).cmp(&(b.first_seen.is_none(), b.first_seen, &b.provider_id))
    });
    entries
}
