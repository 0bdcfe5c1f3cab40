//! Referential-integrity checks over an assembled graph.
//!
//! Problems are reported, not fixed. The runner turns any issue into a
//! `SCHEMA_VALIDATION_FAILED` warning and still emits the graph.

use std::collections::HashSet;

use crate::models::{EventFlag, EvidenceGraph, MAX_EVENT_FACTS};
use crate::pipeline::citations::MAX_SNIPPET_CHARS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

struct Checker {
    issues: Vec<ValidationIssue>,
}

impl Checker {
    fn check(&mut self, ok: bool, path: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.issues.push(ValidationIssue {
                path: path.into(),
                message: message.into(),
            });
        }
    }

    fn unique<'a>(&mut self, kind: &str, ids: impl Iterator<Item = &'a str>) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                self.issues.push(ValidationIssue {
                    path: format!("{kind}/{id}"),
                    message: "duplicate id".into(),
                });
            }
        }
        seen
    }
}

pub fn validate_graph(graph: &EvidenceGraph) -> Vec<ValidationIssue> {
    let mut c = Checker { issues: Vec::new() };

    c.check(!graph.schema_version.is_empty(), "schema_version", "missing");

    let sources = c.unique("source_documents", graph.source_documents.iter().map(|s| s.document_id.as_str()));
    let citations = c.unique("citations", graph.citations.iter().map(|x| x.citation_id.as_str()));
    let providers = c.unique("providers", graph.providers.iter().map(|p| p.provider_id.as_str()));
    let events = c.unique("events", graph.events.iter().map(|e| e.event_id.as_str()));
    let pages: HashSet<u32> = graph.pages.iter().map(|p| p.page_number).collect();

    // ── Pages ──
    for (i, page) in graph.pages.iter().enumerate() {
        let path = format!("pages/{}", page.page_number);
        c.check(page.page_number as usize == i + 1, &path, "page numbers must be contiguous from 1");
        c.check(sources.contains(page.source_document_id.as_str()), &path, "unknown source document");
    }

    // ── Citations ──
    for citation in &graph.citations {
        let path = format!("citations/{}", citation.citation_id);
        c.check(pages.contains(&citation.page_number), &path, "cites a missing page");
        c.check(citation.snippet.chars().count() <= MAX_SNIPPET_CHARS, &path, "snippet too long");
        c.check(
            sources.contains(citation.source_document_id.as_str()),
            &path,
            "unknown source document",
        );
    }

    // ── Documents ──
    for document in &graph.documents {
        let path = format!("documents/{}", document.document_id);
        c.check(document.page_start <= document.page_end, &path, "inverted page range");
        c.check(
            pages.contains(&document.page_start) && pages.contains(&document.page_end),
            &path,
            "page range outside the graph",
        );
        if let Some(provider_id) = &document.provider_id {
            c.check(providers.contains(provider_id.as_str()), &path, "unknown provider");
        }
    }

    // ── Providers ──
    for provider in &graph.providers {
        for evidence in &provider.evidence {
            c.check(
                citations.contains(evidence.citation_id.as_str()),
                format!("providers/{}", provider.provider_id),
                format!("unknown citation {}", evidence.citation_id),
            );
        }
    }

    // ── Events ──
    for event in &graph.events {
        let path = format!("events/{}", event.event_id);
        c.check(
            !event.citation_ids.is_empty() || event.has_flag(EventFlag::MissingCitation),
            &path,
            "no citations and no MISSING_CITATION flag",
        );
        c.check(event.facts.len() <= MAX_EVENT_FACTS, &path, "too many facts");
        c.check(event.confidence <= 100, &path, "confidence outside 0-100");
        for id in event.citation_ids.iter().chain(event.facts.iter().flat_map(|f| &f.citation_ids)) {
            c.check(citations.contains(id.as_str()), &path, format!("unknown citation {id}"));
        }
        if let Some(provider_id) = &event.provider_id {
            c.check(providers.contains(provider_id.as_str()), &path, "unknown provider");
        }
        for page in &event.source_pages {
            c.check(pages.contains(page), &path, format!("unknown page {page}"));
        }
    }

    // ── Gaps ──
    for gap in &graph.gaps {
        let path = format!("gaps/{}", gap.gap_id);
        c.check(events.contains(gap.previous_event_id.as_str()), &path, "unknown previous event");
        c.check(events.contains(gap.next_event_id.as_str()), &path, "unknown next event");
        c.check(gap.start_date < gap.end_date, &path, "empty gap");
    }

    // ── Chronology ──
    let mut ordered = HashSet::new();
    for id in &graph.chronology {
        c.check(events.contains(id.as_str()), "chronology", format!("unknown event {id}"));
        c.check(ordered.insert(id.as_str()), "chronology", format!("{id} listed twice"));
    }

    // ── Extensions ──
    let gap_ids: HashSet<&str> = graph.gaps.iter().map(|g| g.gap_id.as_str()).collect();
    if let Some(requests) = &graph.extensions.record_requests {
        for request in requests {
            for gap_id in &request.gap_ids {
                c.check(
                    gap_ids.contains(gap_id.as_str()),
                    "extensions/record_requests",
                    format!("unknown gap {gap_id}"),
                );
            }
        }
    }
    if let Some(matrix) = &graph.extensions.contradiction_matrix {
        for row in matrix {
            for side in [&row.a, &row.b] {
                c.check(
                    events.contains(side.event_id.as_str()),
                    "extensions/contradiction_matrix",
                    format!("unknown event {}", side.event_id),
                );
            }
        }
    }

    if let Some(ledger) = &graph.extensions.billing_lines {
        for line in &ledger.lines {
            let path = format!("extensions/billing_lines/{}", line.line_id);
            c.check(pages.contains(&line.page_number), &path, "cites a missing page");
            if let Some(provider_id) = &line.provider_id {
                c.check(providers.contains(provider_id.as_str()), &path, "unknown provider");
            }
            for id in &line.citation_ids {
                c.check(citations.contains(id.as_str()), &path, format!("unknown citation {id}"));
            }
        }
    }
    if let Some(specials) = &graph.extensions.specials_summary {
        for entry in &specials.by_provider {
            for id in &entry.citation_ids {
                c.check(
                    citations.contains(id.as_str()),
                    "extensions/specials_summary",
                    format!("unknown citation {id}"),
                );
            }
        }
    }
    if let Some(patient) = &graph.extensions.patient {
        for id in &patient.citation_ids {
            c.check(citations.contains(id.as_str()), "extensions/patient", format!("unknown citation {id}"));
        }
    }

    if c.issues.is_empty() {
        tracing::debug!("Graph passed validation");
    } else {
        tracing::warn!(issues = c.issues.len(), "Graph failed validation");
    }
    c.issues
}
