use serde::Serialize;

use crate::models::{Event, EvidenceGraph};

use super::ExportError;

/// One row per exported event, in chronology order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChronologyRow {
    pub event_id: String,
    pub date: String,
    pub date_tier: String,
    pub provider: String,
    pub event_type: String,
    pub confidence: u8,
    pub flags: String,
    pub facts: String,
    pub citation_ids: String,
    pub source_pages: String,
    pub source_files: String,
}

fn row_for(event: &Event, graph: &EvidenceGraph) -> ChronologyRow {
    let provider = event
        .provider_id
        .as_deref()
        .and_then(|id| graph.provider(id))
        .map(|p| p.display_name.clone())
        .unwrap_or_default();

    let mut files: Vec<&str> = Vec::new();
    for page_number in &event.source_pages {
        let file = graph.page(*page_number).and_then(|page| {
            graph
                .source_documents
                .iter()
                .find(|s| s.document_id == page.source_document_id)
                .map(|s| s.filename.as_str())
        });
        if let Some(file) = file {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }

    ChronologyRow {
        event_id: event.event_id.clone(),
        date: event.date.as_ref().map(|d| d.display()).unwrap_or_default(),
        date_tier: event.date.as_ref().map(|d| d.tier.as_str().to_string()).unwrap_or_default(),
        provider,
        event_type: event.event_type.as_str().to_string(),
        confidence: event.confidence,
        flags: event.flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join("|"),
        facts: event.facts.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join("; "),
        citation_ids: event.citation_ids.join("|"),
        source_pages: event
            .source_pages
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(","),
        source_files: files.join("|"),
    }
}

pub fn chronology_rows(graph: &EvidenceGraph) -> Vec<ChronologyRow> {
    graph.chronology_events().map(|e| row_for(e, graph)).collect()
}

/// The chronology as CSV bytes. The header row is always written, so an
/// empty chronology still yields a valid file.
pub fn chronology_csv(graph: &EvidenceGraph) -> Result<Vec<u8>, ExportError> {
    let mut writer = ::csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record([
        "event_id",
        "date",
        "date_tier",
        "provider",
        "event_type",
        "confidence",
        "flags",
        "facts",
        "citation_ids",
        "source_pages",
        "source_files",
    ])?;
    for row in chronology_rows(graph) {
        writer.serialize(&row)?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CareSetting, EventDate, EventFlag, EventType, EvidenceTier, Fact, FactKind, Page, PageLayout, PageType,
        Provider, ProviderKind, SourceDocument, TextSource,
    };
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn graph() -> EvidenceGraph {
        let event = Event {
            event_id: "evt-000001".into(),
            event_type: EventType::ErVisit,
            date: Some(EventDate::single(
                NaiveDate::from_ymd_opt(2013, 9, 17).unwrap(),
                EvidenceTier::Tier1,
                "service_date",
            )),
            provider_id: Some("prv-0001".into()),
            provider_tier: Some(EvidenceTier::Tier1),
            facts: vec![
                Fact {
                    text: "Chief complaint: neck pain, after MVA".into(),
                    kind: FactKind::ChiefComplaint,
                    confidence: 95,
                    citation_ids: vec!["cit-000001".into()],
                },
                Fact {
                    text: "Cervical strain".into(),
                    kind: FactKind::Assessment,
                    confidence: 90,
                    citation_ids: vec!["cit-000002".into()],
                },
            ],
            citation_ids: vec!["cit-000001".into(), "cit-000002".into()],
            source_pages: vec![1, 2],
            confidence: 100,
            flags: vec![EventFlag::OcrDerived],
            strong_cue: true,
            anchored: true,
            imaging: None,
            billing: None,
            extraction_order: 1,
        };
        let page = |n: u32| Page {
            page_number: n,
            source_document_id: "a1b2c3d4e5f60718".into(),
            source_page_index: n - 1,
            text: String::new(),
            text_source: TextSource::Ocr,
            page_type: PageType::ClinicalNote,
            page_type_score: 3,
            layout: PageLayout::LETTER,
            flags: vec![],
        };
        EvidenceGraph {
            schema_version: "1.0".into(),
            matter_id: "matter-1".into(),
            source_documents: vec![SourceDocument {
                document_id: "a1b2c3d4e5f60718".into(),
                filename: "er_records.pdf".into(),
                mime_type: "application/pdf".into(),
                sha256: "a1b2c3d4e5f60718".into(),
                byte_size: 10,
                page_count: 2,
                bytes: Arc::new(Vec::new()),
            }],
            pages: vec![page(1), page(2)],
            providers: vec![Provider {
                provider_id: "prv-0001".into(),
                display_name: "Mercy Hospital".into(),
                normalized_name: "mercy hospital".into(),
                kind: ProviderKind::Facility,
                care_setting: CareSetting::Er,
                first_seen: None,
                last_seen: None,
                event_count: 1,
                evidence: vec![],
            }],
            chronology: vec!["evt-000001".into()],
            events: vec![event],
            ..EvidenceGraph::default()
        }
    }

    #[test]
    fn one_row_per_exported_event() {
        let rows = chronology_rows(&graph());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date, "2013-09-17");
        assert_eq!(row.date_tier, "tier1");
        assert_eq!(row.provider, "Mercy Hospital");
        assert_eq!(row.flags, "OCR_DERIVED");
        assert_eq!(row.facts, "Chief complaint: neck pain, after MVA; Cervical strain");
        assert_eq!(row.source_pages, "1,2");
        assert_eq!(row.source_files, "er_records.pdf");
    }

    #[test]
    fn csv_is_deterministic_and_quoted() {
        let g = graph();
        let first = chronology_csv(&g).unwrap();
        let second = chronology_csv(&g).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("event_id,date,date_tier"));
        assert!(text.contains("\"Chief complaint: neck pain, after MVA; Cervical strain\""));
    }

    #[test]
    fn empty_chronology_has_header_only() {
        let mut g = graph();
        g.chronology.clear();
        let text = String::from_utf8(chronology_csv(&g).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
