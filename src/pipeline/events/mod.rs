//! Per-page-type event extraction.
//!
//! Each extractor claims a set of page types and turns those pages into
//! cited events. Extractors run in a fixed order (clinical, imaging, PT,
//! billing) and share one run context, so ids follow extraction order.

pub mod billing;
pub mod clinical;
pub mod common;
pub mod imaging;
pub mod pt;

use std::collections::{BTreeMap, HashMap};

use crate::models::{Document, Event, EvidenceTier, Page, PageType, SkippedEvent};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::{find_dates, DateMention};
use crate::pipeline::providers::PageProvider;
use crate::pipeline_config::RunConfig;

pub use billing::BillingExtractor;
pub use clinical::ClinicalExtractor;
pub use imaging::ImagingExtractor;
pub use pt::PtExtractor;

/// Read-only view of the run shared by all extractors.
pub struct ExtractionInput<'a> {
    pub pages: &'a [Page],
    pub documents: &'a [Document],
    pub page_providers: &'a BTreeMap<u32, PageProvider>,
    pub config: &'a RunConfig,
    dates: HashMap<u32, Vec<DateMention>>,
    index: HashMap<u32, usize>,
}

impl<'a> ExtractionInput<'a> {
    pub fn new(
        pages: &'a [Page],
        documents: &'a [Document],
        page_providers: &'a BTreeMap<u32, PageProvider>,
        config: &'a RunConfig,
    ) -> Self {
        let dates = pages
            .iter()
            .map(|p| (p.page_number, find_dates(&p.text, p.page_type)))
            .collect();
        let index = pages.iter().enumerate().map(|(i, p)| (p.page_number, i)).collect();
        Self {
            pages,
            documents,
            page_providers,
            config,
            dates,
            index,
        }
    }

    pub fn page(&self, page_number: u32) -> Option<&'a Page> {
        let pages: &'a [Page] = self.pages;
        self.index.get(&page_number).and_then(|&i| pages.get(i))
    }

    /// Dates found on a page (empty for unknown pages).
    pub fn dates(&self, page_number: u32) -> &[DateMention] {
        self.dates.get(&page_number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Date mentions across several pages, tagged with their page.
    pub fn dates_on(&self, page_numbers: &[u32]) -> Vec<(u32, DateMention)> {
        page_numbers
            .iter()
            .flat_map(|&n| self.dates(n).iter().cloned().map(move |m| (n, m)))
            .collect()
    }

    pub fn segment_of(&self, page_number: u32) -> Option<&'a Document> {
        let documents: &'a [Document] = self.documents;
        documents.iter().find(|d| d.contains_page(page_number))
    }

    pub fn pages_of_type(&self, types: &[PageType]) -> Vec<&'a Page> {
        let pages: &'a [Page] = self.pages;
        pages.iter().filter(|p| types.contains(&p.page_type)).collect()
    }

    /// Provider for an event on these pages: the first page-level provider,
    /// else the segment's provider as tier-2 evidence.
    pub fn provider_for(&self, page_numbers: &[u32]) -> Option<(String, EvidenceTier)> {
        if let Some(pp) = page_numbers.iter().find_map(|n| self.page_providers.get(n)) {
            return Some((pp.provider_id.clone(), pp.tier));
        }
        page_numbers
            .iter()
            .find_map(|&n| self.segment_of(n).and_then(|d| d.provider_id.clone()))
            .map(|id| (id, EvidenceTier::Tier2))
    }
}

/// Events and skip records produced by the extractors.
#[derive(Debug, Default)]
pub struct ExtractionOutput {
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedEvent>,
}

pub trait EventExtractor {
    fn name(&self) -> &'static str;

    /// Page types this extractor consumes.
    fn page_types(&self) -> &'static [PageType];

    fn extract(&self, input: &ExtractionInput<'_>, ctx: &mut RunContext, out: &mut ExtractionOutput);
}

/// The extractor set in run order.
pub fn default_extractors() -> Vec<Box<dyn EventExtractor>> {
    vec![
        Box::new(ClinicalExtractor),
        Box::new(ImagingExtractor),
        Box::new(PtExtractor),
        Box::new(BillingExtractor),
    ]
}

/// Run every extractor over the input.
pub fn extract_events(input: &ExtractionInput<'_>, ctx: &mut RunContext) -> ExtractionOutput {
    let mut out = ExtractionOutput::default();
    for extractor in default_extractors() {
        let before = (out.events.len(), out.skipped.len());
        extractor.extract(input, ctx, &mut out);
        tracing::info!(
            extractor = extractor.name(),
            events = out.events.len() - before.0,
            skipped = out.skipped.len() - before.1,
            "Extractor finished"
        );
    }
    out
}


#[cfg(test)]
mod tests {
    use super::test_support::page;
    use super::*;

    #[test]
    fn provider_falls_back_to_segment_at_tier2() {
        let pages = vec![page(1, "x", PageType::ClinicalNote), page(2, "y", PageType::ClinicalNote)];
        let documents = vec![Document {
            document_id: "doc-0001".into(),
            source_document_id: "src".into(),
            page_start: 1,
            page_end: 2,
            page_types: vec![],
            declared_type: crate::models::DocumentType::MedicalRecord,
            dominant_page_type: PageType::ClinicalNote,
            provider_id: Some("prv-0003".into()),
        }];
        let mut pp = BTreeMap::new();
        pp.insert(
            1,
            PageProvider {
                provider_id: "prv-0001".into(),
                tier: EvidenceTier::Tier1,
            },
        );
        let config = RunConfig::default();
        let input = ExtractionInput::new(&pages, &documents, &pp, &config);

        assert_eq!(input.provider_for(&[1, 2]), Some(("prv-0001".into(), EvidenceTier::Tier1)));
        assert_eq!(input.provider_for(&[2]), Some(("prv-0003".into(), EvidenceTier::Tier2)));
        assert_eq!(input.provider_for(&[9]), None);
    }
}
