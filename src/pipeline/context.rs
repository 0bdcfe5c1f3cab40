//! Per-run mutable state shared by the pipeline stages.

use crate::ids::{IdAllocator, PageAllocator};
use crate::models::{BBoxSource, Page, Warning, WarningCode};

use super::citations::CitationStore;

/// Owned by exactly one run. Nothing in here is global.
#[derive(Debug)]
pub struct RunContext {
    pub pages: PageAllocator,
    pub segment_ids: IdAllocator,
    pub provider_ids: IdAllocator,
    pub event_ids: IdAllocator,
    pub citations: CitationStore,
    pub warnings: Vec<Warning>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            pages: PageAllocator::new(),
            segment_ids: IdAllocator::new("doc", 4),
            provider_ids: IdAllocator::new("prv", 4),
            event_ids: IdAllocator::new("evt", 6),
            citations: CitationStore::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(
            code = ?warning.code,
            page = ?warning.page,
            "{}",
            warning.message
        );
        self.warnings.push(warning);
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Capture a citation; a snippet that could not be located on its page
    /// records a `BBOX_FALLBACK` warning the first time it is cited.
    pub fn cite(&mut self, page: &Page, snippet: &str) -> Option<String> {
        let captured = self.citations.capture(page, snippet)?;
        if captured.created && captured.bbox_source == BBoxSource::PageFallback {
            let warning = Warning::new(
                WarningCode::BboxFallback,
                format!("Citation {} cites the whole page", captured.citation_id),
            )
            .on_page(page.page_number)
            .in_document(&page.source_document_id);
            tracing::debug!(citation_id = %captured.citation_id, page = page.page_number, "Bounding box fell back to full page");
            self.warnings.push(warning);
        }
        Some(captured.citation_id)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
